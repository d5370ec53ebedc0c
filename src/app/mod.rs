mod api;
mod error;
mod settings;

#[doc(inline)]
pub use api::{initialize_sdk, shared_sdk, Sdk, SDK_VERSION};

#[doc(inline)]
pub use error::{internal_error, invalid_argument, SdkError, SdkResult};

#[doc(inline)]
pub use settings::{SdkOptions, SdkSettings};
