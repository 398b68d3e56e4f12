//! Marker types.

/// Marker type describing an entity creation.
#[derive(Clone, Copy, Debug)]
pub struct Creation;

/// Marker type describing the last modification of an entity.
#[derive(Clone, Copy, Debug)]
pub struct Modification;

/// Marker type describing an expiration moment.
#[derive(Clone, Copy, Debug)]
pub struct Expiration;

/// Marker type describing a planned visit or action.
#[derive(Clone, Copy, Debug)]
pub struct Schedule;

/// Marker type describing a completion moment.
#[derive(Clone, Copy, Debug)]
pub struct Completion;

/// Marker type describing a billing moment.
#[derive(Clone, Copy, Debug)]
pub struct Billing;
