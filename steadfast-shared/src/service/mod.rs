/// Generic resource service layer
///
/// # Modules
///
/// - [`resource`]: `Resource` / `MutableResource` strategy traits
/// - [`pipeline`]: list/get/create/update/delete/bulk/search/count/stats/export
/// - [`filter`]: WHERE-clause builder with escaped `ILIKE` search
/// - [`pagination`]: page/limit defaults, bounds and the pagination summary
/// - [`value`]: typed column values bound through `QueryBuilder`
/// - [`export`]: JSON and CSV rendering
/// - [`stats`]: growth statistics
/// - [`audit`]: best-effort audit trail

pub mod audit;
pub mod export;
pub mod filter;
pub mod pagination;
pub mod pipeline;
pub mod resource;
pub mod stats;
pub mod value;

pub use filter::Filter;
pub use pagination::{ListOptions, Page, Pagination};
pub use resource::{MutableResource, Resource};
pub use value::{ColumnValues, SqlValue};
