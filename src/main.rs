use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use prettytable::{Table, row};
use serde::Deserialize;

use slotdb::db::{Database, DbError, FixedRecord, IndexKind};
use slotdb::Key;

#[derive(Parser, Debug)]
#[command(name = "slotdb")]
#[command(version = "0.1.0")]
#[command(about = "Fixed-record database over a B+ tree or static hash index")]
struct Args {
    /// Directory holding the data and index files
    #[arg(short, long, value_name = "DIR", default_value = "slotdb-data")]
    dir: PathBuf,

    /// Index engine backing the database
    #[arg(short, long, value_enum, default_value_t = Engine::BTree)]
    index: Engine,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Engine {
    BTree,
    Hash,
}

impl From<Engine> for IndexKind {
    fn from(engine: Engine) -> Self {
        match engine {
            Engine::BTree => IndexKind::BTree,
            Engine::Hash => IndexKind::Hash,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bulk-load city records from a headered CSV file
    Load {
        /// CSV file with columns id,city,state,weather
        file: PathBuf,
    },
    /// Look up one record by id
    Get { key: Key },
    /// List all records with low <= id <= high
    Range { low: Key, high: Key },
}

/// Sample fixed-width payload: a city weather reading keyed by id.
#[derive(Debug, Clone, Deserialize)]
struct CityRecord {
    id: i64,
    city: String,
    state: String,
    weather: String,
}

const CITY_LEN: usize = 30;
const STATE_LEN: usize = 2;
const WEATHER_LEN: usize = 35;

fn put_str(buf: &mut [u8], text: &str) {
    let bytes = text.as_bytes();
    let n = bytes.len().min(buf.len());
    buf[..n].copy_from_slice(&bytes[..n]);
}

fn get_str(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

impl FixedRecord for CityRecord {
    const SIZE: usize = 8 + CITY_LEN + STATE_LEN + WEATHER_LEN;

    fn key(&self) -> Key {
        self.id
    }

    fn encode(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.id.to_le_bytes());
        put_str(&mut buf[8..8 + CITY_LEN], &self.city);
        put_str(&mut buf[8 + CITY_LEN..8 + CITY_LEN + STATE_LEN], &self.state);
        put_str(&mut buf[8 + CITY_LEN + STATE_LEN..], &self.weather);
    }

    fn decode(buf: &[u8]) -> Self {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&buf[0..8]);
        Self {
            id: i64::from_le_bytes(bytes),
            city: get_str(&buf[8..8 + CITY_LEN]),
            state: get_str(&buf[8 + CITY_LEN..8 + CITY_LEN + STATE_LEN]),
            weather: get_str(&buf[8 + CITY_LEN + STATE_LEN..]),
        }
    }
}

fn print_records<'a>(records: impl IntoIterator<Item = &'a CityRecord>) {
    let mut table = Table::new();
    table.add_row(row!["id", "city", "state", "weather"]);
    for r in records {
        table.add_row(row![r.id, r.city, r.state, r.weather]);
    }
    table.printstd();
}

fn run(args: Args) -> Result<(), DbError> {
    let mut db: Database<CityRecord> = Database::open(&args.dir, args.index.into())?;

    match args.command {
        Command::Load { file } => {
            let loaded = db.load_csv(&file)?;
            println!("Loaded {} records into {}", loaded, args.dir.display());
        }
        Command::Get { key } => match db.get(key)? {
            Some(fetched) => {
                print_records([&fetched.record]);
                println!("({} index pages read)", fetched.index_reads);
            }
            None => println!("No record with id {}", key),
        },
        Command::Range { low, high } => {
            let records = db.range(low, high)?;
            if records.is_empty() {
                println!("No records in [{}, {}]", low, high);
            } else {
                print_records(&records);
                println!("{} records", records.len());
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("Error: {}", err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
