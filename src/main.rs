use csv_core::{ReadFieldResult, ReaderBuilder};
use dfd::{Dfd, DfdConfig, FdCollector, Relation, RelationBuilder};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use std::io::{self, Write};
use std::str;

fn invalid_data<E>(error: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, error)
}

// The first record names the columns; every later record is a row.
fn load_relation<I: io::Read>(mut input: I, null_equals_null: bool) -> io::Result<Relation> {
    let mut inputbuf = [0; 16384];
    let mut fieldbuf = [0; 1024];
    let mut fieldlen = 0;
    let mut record = Vec::new();
    let mut builder: Option<RelationBuilder> = None;
    let mut tsv = ReaderBuilder::new().delimiter(b'\t').build();

    loop {
        let read = input.read(&mut inputbuf)?;
        let mut bytes = &inputbuf[..read];
        loop {
            let (result, nin, nout) = tsv.read_field(bytes, &mut fieldbuf[fieldlen..]);
            bytes = &bytes[nin..];
            fieldlen += nout;
            match result {
                ReadFieldResult::InputEmpty => break,
                ReadFieldResult::OutputFull => {
                    return Err(invalid_data(format!(
                        "field too long on line {}",
                        tsv.line()
                    )));
                }
                ReadFieldResult::Field { record_end } => {
                    let field = str::from_utf8(&fieldbuf[..fieldlen]).map_err(invalid_data)?;
                    fieldlen = 0;
                    record.push(field.to_owned());

                    if record_end {
                        match builder.as_mut() {
                            Some(builder) => builder.push_row(&record).map_err(invalid_data)?,
                            None => {
                                builder = Some(RelationBuilder::new(
                                    record.iter().cloned(),
                                    null_equals_null,
                                ))
                            }
                        }
                        record.clear();
                    }
                }
                ReadFieldResult::End => {
                    let builder = builder.ok_or_else(|| invalid_data("missing header row"))?;
                    return builder.build().map_err(invalid_data);
                }
            }
        }
    }
}

fn main() -> io::Result<()> {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LevelFilter::Info);
    TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .map_err(io::Error::other)?;

    let config = DfdConfig::default();
    let relation = load_relation(io::stdin().lock(), config.null_equals_null)?;

    let collector = FdCollector::new();
    let stats = Dfd::new(config)
        .discover(&relation, &collector)
        .map_err(invalid_data)?;
    log::info!(
        "{} traversals, {} partitions computed, {} cache hits",
        stats.traversals,
        stats.cache_misses,
        stats.cache_hits
    );

    let schema = relation.schema();
    let mut stdout = io::stdout().lock();
    for dependency in collector.into_sorted() {
        writeln!(stdout, "{}", dependency.display(schema))?;
    }
    Ok(())
}
