/// How many finished flows keep answering [`FlowEngine::state`](crate::flows::FlowEngine::state)
/// with their terminal state before being forgotten.
pub const MAX_FINISHED_FLOWS: usize = 256;
