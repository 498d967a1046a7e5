//! Quick categorization: assigning a category to every transaction that
//! shares a description, one description at a time.

mod endpoints;
mod queue;
mod triage;

pub use endpoints::{
    CategorizeRequest, CategorizeResponse, get_uncategorized_descriptions_endpoint,
    update_category_by_description_endpoint,
};
pub use queue::{UncategorizedDescription, get_uncategorized_descriptions};
pub use triage::{TriageSession, TriageStep};
