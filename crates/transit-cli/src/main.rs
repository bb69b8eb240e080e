use clap::{value_parser, Arg, Command, ValueHint};
use transit_cli::input::Input;
use transit_cli::runner::Runner;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("TRANSIT_LOG", "error,transit=info"))
        .init();

    let matches = Command::new("transit")
        .version(clap::crate_version!())
        .author("Michael Lazear <michaellazear92@gmail.com>")
        .about("Import FASTA files and SRM transition lists")
        .arg(
            Arg::new("parameters")
                .required(true)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path to import settings (JSON file)")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("inputs")
                .num_args(1..)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Paths to FASTA files or transition lists to import. Overrides \
                     inputs listed in the configuration file.",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path where imported protein groups will be written (default: stdout)")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("existing")
                .long("existing")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Previous JSON output whose proteins are already in the document. \
                     Proteins with identical sequences are not imported again.",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("decimal-separator")
                .long("decimal-separator")
                .value_parser(value_parser!(char))
                .help("Decimal separator of numbers in the inputs (default = '.')")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("tsv")
                .long("tsv")
                .action(clap::ArgAction::SetTrue)
                .help("Write a flat transition table instead of JSON"),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Written by {author-with-newline}Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    let input = Input::from_arguments(matches)?;

    let runner = input.build().and_then(Runner::new)?;
    runner.run()
}
