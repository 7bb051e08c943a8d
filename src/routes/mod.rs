/// Router Module Index
///
/// Organizes the locally served endpoints. Everything else falls through to the
/// site relay; all of it sits behind the gate middleware applied in `create_router`.

/// Site pages the gate answers itself (root landing) and status introspection.
pub mod public;

/// Login, logout and session introspection for the dashboard.
pub mod session;
