use crate::describe::Describe;

/// Something built from a configuration that can be run.
pub trait Model {
    type Output;

    fn forward(&mut self) -> Self::Output;
}

/// A configuration that knows how to build its model.
///
/// Being [Describe], every configuration can be varied, saved and loaded
/// back before any model is created from it.
pub trait ModelConfig: Describe {
    type Model: Model;

    fn create_model(&self) -> Self::Model;
}

/// Build one model per configuration, in order.
pub fn create_models<C: ModelConfig>(configs: &[C]) -> Vec<C::Model> {
    configs.iter().map(ModelConfig::create_model).collect()
}
