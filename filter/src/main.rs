use structopt::StructOpt;

use mailpost::drain::read_chunks;
use mailpost::{InboundEvent, Pipeline};

mod status;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "mailpost-filter",
    about = "Parse incoming mail from stdin and post it as JSON to EMAIL_API_URL."
)]
struct Opt {
    /// Size of the raw message on stdin, in bytes
    #[structopt(short, long)]
    size: usize,

    /// Config file, merged under EMAIL_* environment variables
    #[structopt(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    // Init logger
    env_logger::builder().format_timestamp_micros().init();

    let opt = Opt::from_args();

    let pipeline = match mailpost::config::load_config(opt.config.as_deref())
        .and_then(Pipeline::from_config)
    {
        Ok(p) => p,
        Err(err) => {
            log::error!("Failed to initialize: {}", err);
            std::process::exit(status::CONFIG);
        }
    };

    // Message body comes in on stdin
    let event = InboundEvent {
        raw: read_chunks(tokio::io::stdin()),
        raw_size: opt.size,
    };

    let code = match pipeline.run(event).await {
        Ok(_) => 0,
        Err(failure) => status::exit_code(&failure),
    };

    std::process::exit(code);
}
