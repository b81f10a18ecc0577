/// Pluggable providers for AI task generation and notification delivery
///
/// Both are traits so the API can be wired to a real provider later; the
/// defaults are simulated and need no network access.
///
/// - [`task_generator`]: `TaskGenerator` + `TemplateTaskGenerator`
/// - [`delivery`]: `DeliveryProvider` + `SimulatedDelivery`

pub mod delivery;
pub mod task_generator;

pub use delivery::{DeliveryError, DeliveryProvider, DeliveryReport, DeliveryRequest, SimulatedDelivery};
pub use task_generator::{
    GeneratedTask, GenerationRequest, GeneratorError, TaskGenerator, TemplateTaskGenerator,
};
