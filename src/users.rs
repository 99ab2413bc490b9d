//! The demo `Users` record and a random generator for it.

use kafka_types::{FieldType, Record, RecordSchema};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Avro document of the demo schema, as registered.
pub const USERS_SCHEMA: &str = r#"{"type":"record","name":"Users","fields":[{"name":"id","type":"int"},{"name":"name","type":"string"},{"name":"age","type":"int"}]}"#;

const NAMES: [&str; 10] = [
    "Alice", "Bob", "Charlie", "David", "Eve", "Frank", "Grace", "Henry", "Ivy", "Jack",
];

/// `Users{id: int, name: string, age: int}`
pub fn users_schema() -> RecordSchema {
    RecordSchema::new("Users")
        .field("id", FieldType::Int)
        .field("name", FieldType::String)
        .field("age", FieldType::Int)
}

/// Build one `Users` record.
pub fn user(id: i32, name: &str, age: i32) -> Record {
    Record::new()
        .with("id", id)
        .with("name", name)
        .with("age", age)
}

/// Source of the records a producer loop publishes.
pub trait RecordGenerator: Send {
    /// The next record and the key to publish it under, or `None` once the
    /// generator is exhausted.
    fn next_record(&mut self) -> Option<(Option<String>, Record)>;
}

/// Endless `Users` records with random contents.
///
/// Ids are drawn from `0..1000`, names from a fixed list of ten, ages from
/// `18..98`. Every record is keyed by its id, so all records of one user
/// land on the same partition.
pub struct RandomUserGenerator {
    rng: StdRng,
}

impl RandomUserGenerator {
    /// Same seed, same sequence.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RecordGenerator for RandomUserGenerator {
    fn next_record(&mut self) -> Option<(Option<String>, Record)> {
        let id = self.rng.random_range(0..1000);
        let name = NAMES[self.rng.random_range(0..NAMES.len())];
        let age = self.rng.random_range(18..98);
        Some((Some(id.to_string()), user(id, name, age)))
    }
}

/// Replays a fixed list of records, then stops.
impl RecordGenerator for std::vec::IntoIter<(Option<String>, Record)> {
    fn next_record(&mut self) -> Option<(Option<String>, Record)> {
        self.next()
    }
}
