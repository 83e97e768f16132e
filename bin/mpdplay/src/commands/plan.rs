use clap::Parser;
use clap_handler::handler;
use mpdplan::StreamController;

use super::{parse_source, HttpOptions, PlayerOptions};

/// Print the segment request plan of a manifest as JSON
#[derive(Parser, Clone, Debug)]
#[clap(name = "plan")]
pub struct PlanCommand {
    #[clap(flatten)]
    pub http: HttpOptions,

    #[clap(flatten)]
    pub player: PlayerOptions,

    /// Pretty-print the JSON output
    #[clap(short, long)]
    pub pretty: bool,

    /// Manifest URL or path
    pub source: String,
}

#[handler(PlanCommand)]
pub async fn plan(args: PlanCommand) -> anyhow::Result<()> {
    let source = parse_source(&args.source)?;
    let controller = StreamController::new(args.http.into_loader()?, args.player.into_config()?);

    let plan = controller.attach_source(source).await?;
    let output = if args.pretty {
        serde_json::to_string_pretty(&plan)?
    } else {
        serde_json::to_string(&plan)?
    };
    println!("{output}");

    Ok(())
}
