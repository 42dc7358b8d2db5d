use ixa::{info, Context, IxaError};

pub mod survey_writer;

/// Initialises the configured output reports. Currently a single survey-output report; kept as
/// its own module so additional report types can register alongside it without touching the
/// driver.
///
/// # Errors
/// Propagates any error from registering the underlying report.
pub fn init(context: &mut Context, output_file: &str) -> Result<(), IxaError> {
    info!("writing survey output to {output_file}");
    survey_writer::init(context, output_file)
}
