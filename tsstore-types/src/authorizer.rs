//! The authorizer capability consumed by `MeasurementNames`/`TagKeys`/`TagValues`
//! (spec §1: "the Store consumes ... an authorizer predicate"). Authorization
//! policy itself is out of scope; this crate only defines the seam the Store
//! calls through, coarse-grained at measurement level since the `Index`
//! capability (§6.4) does not expose per-series tag sets to the Store.

/// Decides whether a measurement is visible to the caller of a catalog query.
pub trait Authorizer: Send + Sync {
    fn authorize_measurement(&self, database: &str, measurement: &str) -> bool;
}

/// The permissive default: every measurement is visible. Matches spec.md's
/// queries having no caller-supplied authorizer in the common case.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize_measurement(&self, _database: &str, _measurement: &str) -> bool {
        true
    }
}
