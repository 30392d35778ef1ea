//! Expergen generates experiment configurations. It takes one base configuration
//! record and produces every combination of alternative values for selected
//! fields, then writes each configuration to its own JSON file and reads such
//! files back into records.
//!
//! # Records
//! A configuration is a [value::Record]: an instance of a [domain::RecordDecl]
//! that lists the named, typed fields of the record. Field types are primitives,
//! lists, string-keyed maps, nested records, optional values, literal strings
//! and unions of record declarations. Declarations are built ahead of time and
//! shared by every instance. A record can only hold values that conform to its
//! declaration: every construction and every assignment is checked.
//!
//! Statically typed configurations take part through the [describe::Describe]
//! trait, which ties a serde type to its declaration.
//!
//! # Variations
//! [variation::generate_variations] takes a base record and a set of candidate
//! values per field path. A field path is dot-delimited (`training.optimizer.lr`)
//! and walks through nested records and maps. The output holds one deep copy of
//! the base per combination of candidates, in a fixed order: paths are taken in
//! insertion order and the last path varies fastest. After the substitutions of
//! a combination, optional transformations are applied to the current values of
//! their fields. A candidate or a transformed value that does not conform to the
//! declared type of its field aborts the whole generation.
//!
//! # Files
//! [store::save] writes `instance_1.json`, `instance_2.json`, ... into a
//! directory, one file per record, optionally leaving out fields equal to their
//! defaults. [store::load_one] and [store::load_all] reconstruct records from such
//! files against a declaration. Union fields are stored without wrapper; the
//! member is recovered from the `type` discriminator when the members declare
//! one, and otherwise by structural matching (see [json]).
//!
//! # Sweep Plans
//! Variations and save options may also be written down in a YAML document and
//! parsed with [plan::SweepPlan::from_yaml].

/// Module to declare record types, their fields and field types.
pub mod domain;

/// Module with the run-time values of records and the access to nested fields
/// by path.
pub mod value;

/// Dot-delimited field paths.
pub mod path;

/// Module that produces the Cartesian product of field variations of a record.
pub mod variation;

/// Module that converts records to JSON trees and reconstructs them back.
pub mod json;

/// Module to save records as individual JSON files and load them back.
pub mod store;

/// Module that bridges statically typed serde configurations to records.
pub mod describe;

/// Module to read sweep plans from YAML.
pub mod plan;

/// Module with traits for configurations that create runnable models.
pub mod model;

pub use describe::Describe;
pub use domain::{DataType, RecordDecl};
pub use path::FieldPath;
pub use store::{load_all, load_one, save, SaveOptions};
pub use value::{Record, Value};
pub use variation::{generate_variations, Transformations, Variations};

#[cfg(test)]
pub fn init_log() {
    use log::{LevelFilter, Record};

    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        // Another test harness may have set a logger already.
        let _ = flexi_logger::Logger::with(LevelFilter::Trace)
            .format(format)
            .start();
    });

    fn format(
        write: &mut dyn std::io::Write,
        _: &mut flexi_logger::DeferredNow,
        record: &Record,
    ) -> std::io::Result<()> {
        write.write_all(
            format!(
                "[{} {}:{}] {} - {}",
                record.level(),
                record.file().unwrap_or_default(),
                record.line().unwrap_or_default(),
                record.module_path().unwrap_or_default(),
                record.args()
            )
            .as_bytes(),
        )
    }
}
