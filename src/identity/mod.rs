mod api;

#[doc(inline)]
pub use api::{SessionContext, SessionContextProvider, UserIdentity};
