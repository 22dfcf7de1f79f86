use clap::Parser;
use miette::Result;
use tote_cli::{cli, commands, error, logger, ui};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);
    let printer = ui::Printer::new(ui::should_use_color(args.no_color), args.quiet);

    let root = commands::package_root(args.cwd.as_deref()).map_err(error::cli_error_to_miette)?;
    let result = match args.into_command() {
        cli::Command::Build(build_args) => commands::build_execute(&root, build_args, printer).await,
        cli::Command::Prepare(prepare_args) => {
            commands::prepare_execute(&root, prepare_args, printer).await
        }
    };

    let code = result.map_err(error::cli_error_to_miette)?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
