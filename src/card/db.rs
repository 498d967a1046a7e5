use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};

use crate::{Error, report::AccountType};

/// Database identifier for a card ownership record.
pub type OwnershipId = i64;

/// User metadata about a card or bank account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardOwnership {
    /// The ID of the record.
    pub id: OwnershipId,
    /// The scraper vendor id of the card company or bank.
    pub vendor: String,
    /// The trailing four digits of the card or account number.
    pub last4: String,
    /// A name the user gave the card, e.g. "Dana's Visa".
    pub nickname: Option<String>,
    /// The bank account the card is charged to, e.g. "hapoalim 6789".
    pub linked_bank_account: Option<String>,
}

/// A card or bank account seen in transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    /// The scraper vendor id of the card company or bank.
    pub vendor: String,
    /// The trailing four digits of the card or account number.
    pub last4: String,
    /// Whether this is a bank account or a credit card.
    pub account_type: AccountType,
    /// How many transactions were made with the card.
    pub transaction_count: i64,
    /// The ownership record, if the user saved one.
    pub ownership_id: Option<OwnershipId>,
    /// A name the user gave the card.
    pub nickname: Option<String>,
    /// The bank account the card is charged to.
    pub linked_bank_account: Option<String>,
}

pub fn create_card_ownership_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS card_ownership (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            vendor TEXT NOT NULL,
            last4 TEXT NOT NULL,
            nickname TEXT,
            linked_bank_account TEXT,
            UNIQUE(vendor, last4)
        )",
        (),
    )?;

    Ok(())
}

/// Save the nickname of the card `(vendor, last4)`, creating its record if needed.
///
/// An existing bank link is kept.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn upsert_card_ownership(
    vendor: &str,
    last4: &str,
    nickname: Option<&str>,
    connection: &Connection,
) -> Result<CardOwnership, Error> {
    connection
        .prepare(
            "INSERT INTO card_ownership (vendor, last4, nickname) VALUES (?1, ?2, ?3)
             ON CONFLICT(vendor, last4) DO UPDATE SET nickname = excluded.nickname
             RETURNING id, vendor, last4, nickname, linked_bank_account",
        )?
        .query_row((vendor, last4, nickname), map_ownership_row)
        .map_err(Error::from)
}

/// Link the card of ownership record `id` to a bank account, or unlink it with `None`.
///
/// # Errors
/// Returns [Error::UpdateMissingCard] if there is no such record, or an SQL error.
pub fn link_bank_account(
    id: OwnershipId,
    linked_bank_account: Option<&str>,
    connection: &Connection,
) -> Result<CardOwnership, Error> {
    connection
        .prepare(
            "UPDATE card_ownership SET linked_bank_account = ?2 WHERE id = ?1
             RETURNING id, vendor, last4, nickname, linked_bank_account",
        )?
        .query_row((id, linked_bank_account), map_ownership_row)
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::UpdateMissingCard,
            error => error.into(),
        })
}

/// Every card seen in transactions, with its ownership metadata.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_cards(connection: &Connection) -> Result<Vec<Card>, Error> {
    connection
        .prepare(
            "SELECT t.vendor, t.last4, COUNT(*), o.id, o.nickname, o.linked_bank_account
             FROM \"transaction\" t
             LEFT JOIN card_ownership o ON o.vendor = t.vendor AND o.last4 = t.last4
             WHERE t.last4 IS NOT NULL
             GROUP BY t.vendor, t.last4
             ORDER BY t.vendor ASC, t.last4 ASC",
        )?
        .query_map([], |row| {
            let vendor: String = row.get(0)?;
            Ok(Card {
                account_type: AccountType::of_vendor(&vendor),
                vendor,
                last4: row.get(1)?,
                transaction_count: row.get(2)?,
                ownership_id: row.get(3)?,
                nickname: row.get(4)?,
                linked_bank_account: row.get(5)?,
            })
        })?
        .map(|result| result.map_err(Error::from))
        .collect()
}

fn map_ownership_row(row: &Row) -> Result<CardOwnership, rusqlite::Error> {
    Ok(CardOwnership {
        id: row.get(0)?,
        vendor: row.get(1)?,
        last4: row.get(2)?,
        nickname: row.get(3)?,
        linked_bank_account: row.get(4)?,
    })
}
