//! Cards and bank accounts seen in transactions, with user metadata such as
//! nicknames and which bank account a credit card is charged to.

mod db;
mod endpoints;

pub use db::{Card, CardOwnership, OwnershipId, create_card_ownership_table, get_cards};
pub use endpoints::{get_cards_endpoint, update_card_ownership_endpoint, upsert_card_endpoint};
