//! Print the text lines of an invoice page with their indices

use clap::Parser;
use fatura_calendar::{page_lines, vendors, PageSelector, Vendor};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "dump_lines", about = "Show the text lines the field extraction works on")]
struct Args {
    /// PDF file to read
    pdf: PathBuf,

    /// Read the last page instead of the first
    #[arg(long)]
    last: bool,

    /// Also run the extraction for the vendor in the file name
    #[arg(long)]
    extract: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let page = if args.last {
        PageSelector::Last
    } else {
        PageSelector::First
    };

    let lines = match page_lines(&args.pdf, page) {
        Ok(lines) => lines,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    println!("=== {} ({:?} page, {} lines) ===", args.pdf.display(), page, lines.len());
    for (i, line) in lines.iter().enumerate() {
        println!("{:>4}  {:?}", i, line);
    }

    if args.extract {
        let name = args
            .pdf
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(vendor) = Vendor::from_file_name(&name) else {
            eprintln!("No known vendor in {:?}", name);
            process::exit(1);
        };
        println!();
        match vendors::extract(vendor, &args.pdf) {
            Ok(invoice) => println!("{:#?}", invoice),
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        }
    }
}
