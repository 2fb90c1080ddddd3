use mxfkit_klv::KlvReader;

use crate::cmd::{load_dictionary, open, KeysArgs};
use crate::exit::{klv_error, CliResult, SUCCESS};
use crate::output::{KeyEntry, OutputFormat, Printer};

pub fn run(args: KeysArgs, format: OutputFormat) -> CliResult<i32> {
    let dictionary = load_dictionary(args.dictionary.as_deref())?;
    let mut printer = Printer::new(format, false);

    for record in KlvReader::new(open(&args.path)?) {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                printer.finish();
                return Err(klv_error("keys failed", err));
            }
        };
        printer.key(&KeyEntry::new(
            &record,
            dictionary.resolve_label_symbol(&record.key),
        ));
    }
    printer.finish();
    Ok(SUCCESS)
}
