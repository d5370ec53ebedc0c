/// Maximum number of entries a property bag holds, implicit properties included.
pub const MAX_PROPERTIES: usize = 10;

pub const MAX_PROPERTY_KEY_LENGTH: usize = 128;
pub const MAX_PROPERTY_VALUE_LENGTH: usize = 1024;
