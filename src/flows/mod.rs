mod api;
mod constants;
mod kind;

#[doc(inline)]
pub use api::{FlowEngine, FlowState, FlowToken};

#[doc(inline)]
pub use constants::MAX_FINISHED_FLOWS;

#[doc(inline)]
pub use kind::{
    FlowDetails, FlowKind, PurchaseDetails, RegistrationDetails, SubscriptionPurchaseDetails,
};
