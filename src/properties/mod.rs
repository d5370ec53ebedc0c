mod bag;
mod constants;

#[doc(inline)]
pub use bag::{PropertyBag, PropertyValue};

#[doc(inline)]
pub use constants::{MAX_PROPERTIES, MAX_PROPERTY_KEY_LENGTH, MAX_PROPERTY_VALUE_LENGTH};
