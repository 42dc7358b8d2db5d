//! Ordered deployment of timed and continuous interventions (component C13).

pub mod case_management;
pub mod cohort;
pub mod gvi;
pub mod imported_infections;
pub mod irs;
pub mod larviciding;
pub mod mda;
pub mod net;
pub mod vaccine;

use ixa::{define_data_plugin, Context};

use crate::host_transmission::InterventionComponentType;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DeploymentTime {
    /// Fires at exactly one step.
    Timed(f64),
    /// Applied to each human when their age (in whole years) crosses this target.
    ContinuousAtAge(u32),
}

pub struct Deployment {
    pub time: DeploymentTime,
    pub component_type: InterventionComponentType,
    pub component_id: u32,
    pub action: Box<dyn Fn(&mut Context) + Send + Sync>,
}

#[derive(Default)]
pub struct InterventionManagerState {
    /// Sorted by time at `finalize_deployments`, then by `(component_type, component_id)` within
    /// a step, so two interventions scheduled for the same step always dispatch in the same order
    /// regardless of registration order (§4.13/§5).
    deployments: Vec<Deployment>,
    next_timed_index: usize,
}

define_data_plugin!(
    InterventionManager,
    InterventionManagerState,
    InterventionManagerState::default()
);

pub trait ContextInterventionManagerExt {
    fn register_deployment(&mut self, deployment: Deployment);

    /// Finalises deployment ordering; must be called once after all deployments are registered
    /// and before the driver starts stepping.
    fn finalize_deployments(&mut self);

    /// Dispatches every timed deployment scheduled for `current_step`, in stable
    /// `(component_type, component_id)` order.
    fn dispatch_timed_deployments(&mut self, current_step: f64);
}

impl ContextInterventionManagerExt for Context {
    fn register_deployment(&mut self, deployment: Deployment) {
        self.get_data_container_mut(InterventionManager)
            .deployments
            .push(deployment);
    }

    fn finalize_deployments(&mut self) {
        let state = self.get_data_container_mut(InterventionManager);
        state.deployments.sort_by(|a, b| {
            let time_key = |d: &Deployment| match d.time {
                DeploymentTime::Timed(t) => t,
                DeploymentTime::ContinuousAtAge(_) => f64::INFINITY,
            };
            time_key(a)
                .partial_cmp(&time_key(b))
                .unwrap()
                .then(a.component_type.cmp(&b.component_type))
                .then(a.component_id.cmp(&b.component_id))
        });
    }

    fn dispatch_timed_deployments(&mut self, current_step: f64) {
        loop {
            let next_index = {
                let state = self.get_data_container(InterventionManager).unwrap();
                state
                    .deployments
                    .get(state.next_timed_index)
                    .and_then(|d| match d.time {
                        DeploymentTime::Timed(t) if (t - current_step).abs() < 1e-9 => {
                            Some(state.next_timed_index)
                        }
                        _ => None,
                    })
            };
            let Some(index) = next_index else { break };
            self.get_data_container_mut(InterventionManager)
                .next_timed_index = index + 1;
            // Deployments never move or get removed once registered, so swapping the action out
            // for a no-op keeps the borrow checker happy without `Rc`/`Arc` on every closure.
            let action = {
                let state = self.get_data_container_mut(InterventionManager);
                std::mem::replace(
                    &mut state.deployments[index].action,
                    Box::new(|_: &mut Context| {}),
                )
            };
            action(self);
        }
    }
}

#[cfg(test)]
mod test {
    use super::{ContextInterventionManagerExt, Deployment, DeploymentTime};
    use crate::host_transmission::InterventionComponentType;
    use ixa::Context;

    #[test]
    fn test_stable_ordering_independent_of_registration_order() {
        let mut context = Context::new();
        let order_log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));

        for id in [3u32, 1, 2] {
            let log = order_log.clone();
            context.register_deployment(Deployment {
                time: DeploymentTime::Timed(5.0),
                component_type: InterventionComponentType::Itn,
                component_id: id,
                action: Box::new(move |_| log.borrow_mut().push(id)),
            });
        }
        context.finalize_deployments();
        context.dispatch_timed_deployments(5.0);
        assert_eq!(*order_log.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn test_deployment_fires_only_once() {
        let mut context = Context::new();
        let count = std::rc::Rc::new(std::cell::RefCell::new(0));
        let count_clone = count.clone();
        context.register_deployment(Deployment {
            time: DeploymentTime::Timed(1.0),
            component_type: InterventionComponentType::Irs,
            component_id: 0,
            action: Box::new(move |_| *count_clone.borrow_mut() += 1),
        });
        context.finalize_deployments();
        context.dispatch_timed_deployments(1.0);
        context.dispatch_timed_deployments(1.0);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_types_sort_before_ids_within_same_time() {
        let mut context = Context::new();
        let order_log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        for (component_type, id) in [
            (InterventionComponentType::Irs, 1u32),
            (InterventionComponentType::Itn, 1u32),
            (InterventionComponentType::Bsv, 1u32),
        ] {
            let log = order_log.clone();
            context.register_deployment(Deployment {
                time: DeploymentTime::Timed(2.0),
                component_type,
                component_id: id,
                action: Box::new(move |_| log.borrow_mut().push(component_type)),
            });
        }
        context.finalize_deployments();
        context.dispatch_timed_deployments(2.0);
        assert_eq!(
            *order_log.borrow(),
            vec![
                InterventionComponentType::Bsv,
                InterventionComponentType::Itn,
                InterventionComponentType::Irs,
            ]
        );
    }
}
