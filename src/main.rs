use std::path::PathBuf;
use std::process::ExitCode;

use malaria_sim::driver::{run_simulation, RunOptions};
use malaria_sim::error::{classify, ExitCode as ClassifiedExitCode};

const USAGE: &str = "\
Usage: malaria-sim --input <scenario.json> --output <survey.tsv> [options]

Options:
  --input <path>             Scenario JSON document (required)
  --output <path>            Survey output file (required)
  --seed <u64>                Override the scenario's RNG seed
  --checkpoint <dir>          Directory to read/write checkpoint files
  --checkpoint-stop           Stop immediately after writing a checkpoint
  --compress-output           Gzip the survey output file
  --print-interventions        Print the resolved intervention schedule and exit
  --print-survey-times         Print the resolved survey times and exit
  --deprecation-warnings       Warn on deprecated scenario fields
  --help                      Print this message and exit";

struct Cli {
    options: RunOptions,
    help: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Cli, String> {
    let mut input = None;
    let mut output = None;
    let mut seed = None;
    let mut checkpoint = None;
    let mut checkpoint_stop = false;
    let mut compress_output = false;
    let mut print_interventions = false;
    let mut print_survey_times = false;
    let mut deprecation_warnings = false;
    let mut help = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => help = true,
            "--input" => input = Some(PathBuf::from(args.next().ok_or("--input requires a value")?)),
            "--output" => output = Some(PathBuf::from(args.next().ok_or("--output requires a value")?)),
            "--seed" => {
                let value = args.next().ok_or("--seed requires a value")?;
                seed = Some(value.parse::<u64>().map_err(|e| format!("invalid --seed: {e}"))?);
            }
            "--checkpoint" => {
                checkpoint = Some(PathBuf::from(args.next().ok_or("--checkpoint requires a value")?));
            }
            "--checkpoint-stop" => checkpoint_stop = true,
            "--compress-output" => compress_output = true,
            "--print-interventions" => print_interventions = true,
            "--print-survey-times" => print_survey_times = true,
            "--deprecation-warnings" => deprecation_warnings = true,
            other => return Err(format!("unrecognized argument {other:?}")),
        }
    }

    if help {
        return Ok(Cli {
            options: RunOptions {
                input: PathBuf::new(),
                seed,
                checkpoint,
                checkpoint_stop,
                output: PathBuf::new(),
                compress_output,
                print_interventions,
                print_survey_times,
                deprecation_warnings,
            },
            help: true,
        });
    }

    let input = input.ok_or("--input is required")?;
    let output = output.ok_or("--output is required")?;

    Ok(Cli {
        options: RunOptions {
            input,
            seed,
            checkpoint,
            checkpoint_stop,
            output,
            compress_output,
            print_interventions,
            print_survey_times,
            deprecation_warnings,
        },
        help: false,
    })
}

fn main() -> ExitCode {
    let cli = match parse_args(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(message) => {
            eprintln!("{message}\n\n{USAGE}");
            return ExitCode::from(ClassifiedExitCode::Default.code() as u8);
        }
    };

    if cli.help {
        println!("{USAGE}");
        return ExitCode::from(ClassifiedExitCode::Cmd.code() as u8);
    }

    if cli.options.print_interventions || cli.options.print_survey_times {
        let mut context = ixa::Context::new();
        if let Err(error) = malaria_sim::parameters::init_parameters(&mut context, &cli.options.input) {
            eprintln!("malaria-sim: error: {error:?}");
            return ExitCode::from(classify(&error).code() as u8);
        }
        let parameters = ixa::ContextGlobalPropertiesExt::get_global_property_value(
            &context,
            malaria_sim::parameters::Parameters,
        )
        .expect("just loaded")
        .clone();
        if cli.options.print_interventions {
            for intervention in &parameters.interventions {
                println!("{intervention:?}");
            }
        }
        if cli.options.print_survey_times {
            for time in &parameters.monitoring.survey_times {
                println!("{time}");
            }
        }
        return ExitCode::from(ClassifiedExitCode::Cmd.code() as u8);
    }

    // Checkpoint writing, stopping, and resuming are all handled inside run_simulation itself
    // (see driver.rs): a --checkpoint-stop run writes one checkpoint and returns early; a run
    // pointed at an existing checkpoint directory resumes from it instead of reseeding.
    let mut context = ixa::Context::new();
    if let Err(error) = run_simulation(&mut context, &cli.options) {
        let exit_code = classify(&error);
        if exit_code == ClassifiedExitCode::Traced {
            eprintln!("malaria-sim: fatal error: {error:?}");
        } else {
            eprintln!("malaria-sim: error: {error:?}");
        }
        return ExitCode::from(exit_code.code() as u8);
    }

    ExitCode::SUCCESS
}
