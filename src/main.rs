use clap::Parser;
use midi_recorder::cli::{self, Args, Command};
use midi_recorder::midi_input::MidirBackend;
use tracing_subscriber::EnvFilter;

/// Route `log` records to stderr. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("midi_recorder={}", level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let result = match &args.command {
        Some(Command::ListDevices) => cli::list_devices(&MidirBackend::new()),
        Some(Command::Config { action }) => {
            cli::handle_config_action(action.clone(), args.config.as_deref())
        }
        None => cli::record(&args),
    };

    if let Err(e) = result {
        let code = e.exit_code();
        if code == 0 {
            println!("\nExiting...");
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(code);
    }
}
