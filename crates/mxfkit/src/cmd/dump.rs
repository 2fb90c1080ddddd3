use std::sync::Arc;

use mxfkit_klv::FramerConfig;
use mxfkit_object::{DetailerConfig, ObjectReader};
use mxfkit_types::TypeRegistry;
use tracing::{info, warn};

use crate::cmd::{is_filler, load_dictionary, open, DumpArgs};
use crate::exit::{stream_error, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{DumpEntry, OutputFormat, Printer};

pub fn run(args: DumpArgs, format: OutputFormat) -> CliResult<i32> {
    let dictionary = load_dictionary(args.dictionary.as_deref())?;
    let registry = Arc::new(TypeRegistry::new(Arc::clone(&dictionary)));
    let file = open(&args.path)?;

    let config = DetailerConfig {
        fail_on_unresolved_property: args.strict,
    };
    let mut framer = FramerConfig::default();
    if let Some(max) = args.max_value_size {
        framer.max_value_size = max;
    }
    let reader = ObjectReader::with_config(file, registry, framer, config);
    let mut printer = Printer::new(format, args.flatten);

    let mut records = 0usize;
    let mut failed = 0usize;
    for item in reader {
        let decoded = match item {
            Ok(decoded) => decoded,
            Err(err) if err.is_fatal() || args.fail_fast => {
                printer.finish();
                return Err(stream_error("dump failed", err));
            }
            Err(err) => {
                warn!(error = %err, "skipping record");
                failed += 1;
                continue;
            }
        };

        records += 1;
        let entry = DumpEntry::new(decoded, |key| dictionary.resolve_label_symbol(key));
        if !args.filler && is_filler(entry.class.as_deref()) {
            continue;
        }
        printer.dump(&entry);
    }
    printer.finish();

    info!(
        path = %args.path.display(),
        records,
        failed,
        "completed dump"
    );
    Ok(if failed > 0 { DATA_INVALID } else { SUCCESS })
}
