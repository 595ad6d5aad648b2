use clap::{Parser, Subcommand};

/// This is a survey ingestion program: it reshapes a wide-format survey export into
/// normalized tables and summarizes them.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path or ':memory:') The SQLite database holding the survey schemas.
    #[clap(long, env = "DATABASE_CONNECTION_STRING", global = true, value_parser)]
    pub connection: Option<String>,

    /// The schema (one per survey year) to read from and write to, for example sac_survey_2023.
    #[clap(long, env = "DATABASE_SCHEMA", global = true, value_parser)]
    pub schema: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, global = true, takes_value = false)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Reads a survey export, validates its header and writes the normalized records.
    Ingest {
        /// (file path) The raw survey results.
        #[clap(short, long, env = "INPUT_FILEPATH", value_parser)]
        input: Option<String>,

        /// (file path) The JSON descriptor of the survey instrument for this year.
        #[clap(long, env = "SURVEY_INSTRUMENT", value_parser)]
        instrument: Option<String>,

        /// (default csv) The type of the input: csv or xlsx.
        #[clap(long, value_parser)]
        input_type: Option<String>,

        /// When using an Excel file, indicates the name of the worksheet to use.
        #[clap(long, value_parser)]
        excel_worksheet_name: Option<String>,

        /// Only reconcile and validate the header, without writing anything.
        #[clap(long, takes_value = false)]
        check_header: bool,

        /// Delete the responses already present in the schema before writing, in the same transaction.
        #[clap(long, takes_value = false)]
        replace: bool,
    },
    /// Replaces the question catalog with the content of a CSV file
    /// (question_id,question_type,question_text).
    LoadCatalog {
        /// (file path) The catalog in CSV format.
        #[clap(long, value_parser)]
        catalog: String,
    },
    /// Replaces the manually curated categories of the open responses with the content of a CSV file
    /// (question_id,sub_question_id,respondent_id,grammar,middle,high,category,sentiment).
    LoadCategories {
        /// (file path) The categories in CSV format.
        #[clap(long, value_parser)]
        categories: String,
    },
    /// Summarizes the normalized tables in JSON format.
    Report {
        /// (file path, 'stdout' or empty) Where to write the report.
        #[clap(short, long, value_parser)]
        out: Option<String>,

        /// (file path) A reference report in JSON format. If provided, the program will check that
        /// the computed report matches the reference.
        #[clap(short, long, value_parser)]
        reference: Option<String>,

        /// (default 25) The number of words kept per question for the word frequencies.
        #[clap(long, value_parser)]
        top_words: Option<usize>,
    },
}
