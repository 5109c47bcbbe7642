use crate::CLAP_STYLING;
use clap::{arg, command};
use oidwalk_scanner::DEFAULT_BASE_URL;
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("oidwalk")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("oidwalk")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Initializes the oidwalk database on your filesystem")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Location to store the oidwalk database")
                        .default_value("~/.config/oidwalk/"),
                )
                .arg(
                    arg!(-f - -"force")
                        .help(
                            "Forces the overwriting of any existing database at the specified \
                        location.",
                        )
                        .required(false),
                ),
        )
        .subcommand(
            command!("crawl")
                .about(
                    "Walk the OID tree from one or more roots, storing one record per node.",
                )
                .arg(
                    arg!(--"db" <PATH>)
                        .required(false)
                        .help("Path to the oidwalk database")
                        .default_value("~/.config/oidwalk/oidwalk.db"),
                )
                .arg(
                    arg!(--"base-url" <URL>)
                        .required(false)
                        .help("Registry site serving one page per identifier")
                        .value_parser(clap::value_parser!(Url))
                        .default_value(DEFAULT_BASE_URL),
                )
                .arg(
                    arg!(-r --"root" <OID>)
                        .required(false)
                        .help("Identifier to start from (repeatable, default: 0, 1 and 2)")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(--"seed-file" <PATH>)
                        .required(false)
                        .help("JSON output of `oidwalk enumerate`; its identifiers become roots")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-d --"max-depth" <DEPTH>)
                        .required(false)
                        .help("Maximum depth below a root")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("64"),
                )
                .arg(
                    arg!(-s --"skip" <OID>)
                        .required(false)
                        .help("Identifier never to visit (repeatable)")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(--"skip-file" <PATH>)
                        .required(false)
                        .help("Newline-delimited file of identifiers never to visit")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(--"drill-to" <OID>)
                        .required(false)
                        .help("Only descend toward this identifier until it has been visited")
                        .conflicts_with("resume"),
                )
                .arg(
                    arg!(--"resume")
                        .required(false)
                        .help("Restart from the root recorded by the last aborted crawl")
                        .action(clap::ArgAction::SetTrue)
                        .conflicts_with_all(["root", "seed-file"]),
                )
                .arg(
                    arg!(--"fan-out-depth" <DEPTH>)
                        .required(false)
                        .help("Visit children of nodes at this depth in parallel (repeatable)")
                        .value_parser(clap::value_parser!(usize))
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(--"fan-out-oid" <OID>)
                        .required(false)
                        .help("Visit children of this identifier in parallel (repeatable)")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(--"fan-out-fraction" <FRACTION>)
                        .required(false)
                        .help("Share of available cores used as parallel workers")
                        .value_parser(clap::value_parser!(f64))
                        .default_value("0.5"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Request timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("10"),
                ),
        )
        .subcommand(
            command!("enumerate")
                .about("Read the table of a saved registry page into a JSON seed file")
                .arg(
                    arg!(<FILE>)
                        .required(true)
                        .help("Saved HTML page containing the table")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(true)
                        .help("Where to write the JSON rows")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(--"base-url" <URL>)
                        .required(false)
                        .help("Base URL used to build each row's link")
                        .default_value(DEFAULT_BASE_URL),
                )
                .arg(
                    arg!(--"pretty")
                        .required(false)
                        .help("Indent the JSON output")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            command!("drill-path")
                .about("Print the drill path leading to an identifier")
                .arg(arg!(<OID>).required(true).help("Target identifier, e.g. 0.4.0.127")),
        )
        .subcommand(
            command!("export")
                .about("Write every stored record to a JSON file")
                .arg(
                    arg!(--"db" <PATH>)
                        .required(false)
                        .help("Path to the oidwalk database")
                        .default_value("~/.config/oidwalk/oidwalk.db"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(true)
                        .help("Where to write the records")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
}
