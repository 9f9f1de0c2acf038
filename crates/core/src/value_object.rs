//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values.
/// `Money { minor_units: 100 }` is a value object; an `ItemAccount` with an
/// identifier is an entity.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
