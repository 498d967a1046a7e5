use std::error::Error;
use std::path::Path;
use std::process::exit;

use clap::Parser;
use rusqlite::Connection;
use time::{Date, Duration, OffsetDateTime};

use moneyboard::{Transaction, TransactionBuilder, import_transactions, initialize_db};

/// A utility for creating a demo database for the REST API server of moneyboard.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,

    /// How many days of transactions to create, ending today.
    #[arg(long, short, default_value_t = 90)]
    days: i64,
}

const BUDGETS: [(&str, f64); 5] = [
    ("Groceries", 2500.0),
    ("Restaurants", 800.0),
    ("Transport", 600.0),
    ("Utilities", 1200.0),
    ("Entertainment", 400.0),
];

const RULES: [(&str, &str); 6] = [
    ("shufersal", "Groceries"),
    ("rami levy", "Groceries"),
    ("wolt", "Restaurants"),
    ("rav kav", "Transport"),
    ("electric company", "Utilities"),
    ("netflix", "Entertainment"),
];

/// `(description, amount, every n days)` for card purchases.
const CARD_PURCHASES: [(&str, f64, i64); 8] = [
    ("SHUFERSAL DEAL", -312.40, 4),
    ("RAMI LEVY", -187.90, 6),
    ("WOLT", -94.00, 3),
    ("RAV KAV ONLINE", -50.00, 7),
    ("NETFLIX.COM", -54.90, 30),
    ("ELECTRIC COMPANY", -420.00, 30),
    ("SUPER-PHARM", -76.30, 9),
    ("AROMA ESPRESSO BAR", -32.00, 2),
];

/// Create and populate a database for manual testing.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    match output_path.extension() {
        None => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        _ => {}
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let conn = Connection::open(output_path)?;

    initialize_db(&conn)?;

    println!("Creating budgets and rules...");

    for (category, budget_limit) in BUDGETS {
        conn.execute(
            "INSERT INTO budget (category, budget_limit) VALUES (?1, ?2)",
            (category, budget_limit),
        )?;
    }

    conn.execute(
        "INSERT INTO total_budget (id, budget_limit) VALUES (1, ?1)",
        (5000.0,),
    )?;

    for (pattern, category) in RULES {
        conn.execute(
            "INSERT INTO description_rule (pattern, category) VALUES (?1, ?2)",
            (pattern, category),
        )?;
    }

    println!("Creating transactions...");

    let today = OffsetDateTime::now_utc().date();
    let summary = import_transactions(demo_transactions(today, args.days), &conn)?;

    println!(
        "Created {} transactions, {} categorized by rules.",
        summary.inserted, summary.categorized
    );
    println!("Success!");

    Ok(())
}

fn demo_transactions(today: Date, days: i64) -> Vec<TransactionBuilder> {
    let mut transactions = Vec::new();

    for day in 0..days {
        let date = today - Duration::days(day);

        for (description, amount, every) in CARD_PURCHASES {
            if day % every == 0 {
                transactions.push(
                    Transaction::build(amount, date, description, "isracard")
                        .card6_digits(Some("458012")),
                );
            }
        }

        if day % 5 == 0 {
            transactions.push(
                Transaction::build(-129.00, date, "GOLDA ICE CREAM", "max")
                    .card6_digits(Some("532610")),
            );
        }

        if date.day() == 10 {
            transactions.push(
                Transaction::build(14500.00, date, "SALARY", "hapoalim")
                    .account_number(Some("12-600-123456")),
            );
            transactions.push(
                Transaction::build(-4800.00, date, "RENT TRANSFER", "hapoalim")
                    .account_number(Some("12-600-123456"))
                    .category(Some("Housing")),
            );
        }
    }

    transactions
}
