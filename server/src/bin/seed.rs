//! Insert one slot into the inventory, out-of-band.
//!
//! ```text
//! seed <name> <capacity> [YYYY-MM-DD]
//! ```

use seatbook_core::{InventoryStore, NaiveDate, NewSlot};
use seatbook_postgres::PostgresInventoryStore;
use seatbook_server::config::Config;

const USAGE: &str = "usage: seed <name> <capacity> [YYYY-MM-DD]";

fn parse_args(args: &[String]) -> Result<NewSlot, String> {
    let [name, capacity, rest @ ..] = args else {
        return Err(USAGE.to_string());
    };
    let capacity: u32 = capacity
        .parse()
        .map_err(|e| format!("invalid capacity {capacity:?}: {e}"))?;

    let slot = NewSlot::new(name.clone(), capacity);
    match rest {
        [] => Ok(slot),
        [date] => {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|e| format!("invalid date {date:?}: {e}"))?;
            Ok(slot.on(date))
        }
        _ => Err(USAGE.to_string()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let slot = parse_args(&args)?;

    let config = Config::from_env();
    let store = PostgresInventoryStore::connect(
        &config.database.url,
        config.database.max_connections,
        config.database.connect_timeout(),
    )
    .await?;
    store.migrate().await?;

    let id = store.create_slot(slot).await?;
    println!("created slot {id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parses_name_capacity_and_date() {
        let slot = parse_args(&args(&["Matinee", "40", "2025-03-14"]));
        assert_eq!(
            slot,
            Ok(NewSlot::new("Matinee", 40).on(NaiveDate::from_ymd_opt(2025, 3, 14).unwrap_or_default()))
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_args(&args(&["Matinee"])).is_err());
        assert!(parse_args(&args(&["Matinee", "-1"])).is_err());
        assert!(parse_args(&args(&["Matinee", "4", "14/03/2025"])).is_err());
        assert!(parse_args(&args(&["Matinee", "4", "2025-03-14", "x"])).is_err());
    }
}
