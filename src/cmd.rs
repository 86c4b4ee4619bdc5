use clap::{Parser, Subcommand};

#[derive(Debug, Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Generate flows and send them to an IPFIX collector
    Run {
        #[arg(short, long, default_value = None, help = "TOML configuration file")]
        config: Option<String>,
        #[arg(long, help = "Address of the collector, such as \"127.0.0.1:4739\"")]
        collector: Option<String>,
        #[arg(short, long, help = "Overall number of flow pairs to generate per second")]
        flows_per_second: Option<u64>,
        #[arg(short, long, help = "Number of ticks per second")]
        ticks_per_second: Option<u64>,
        #[arg(long, help = "Number of flow simulator threads")]
        simulators: Option<usize>,
        #[arg(short, long, help = "Number of export worker threads")]
        workers: Option<usize>,
        #[arg(
            short,
            long,
            help = "Capacity of the channel between the simulators and the workers. 0 means a synchronous hand-off"
        )]
        buffer_size: Option<usize>,
        #[arg(long, help = "Maximum size in bytes of an IPFIX message")]
        max_message_size: Option<usize>,
        #[arg(short, long, help = "Seed for random number generation")]
        seed: Option<u64>,
        #[arg(long, help = "Network of the source addresses, such as \"10.0.0.0/8\"")]
        src_network: Option<String>,
        #[arg(long, help = "Network of the destination addresses")]
        dst_network: Option<String>,
        #[arg(
            long,
            num_args = 0..=1,
            default_missing_value = "0.75",
            help = "Skip a tick when the channel is filled above this ratio (0.75 by default), instead of when it cannot hold the whole tick"
        )]
        fill_ratio: Option<f64>,
        #[arg(short = 'd', long, default_value = None, help = "Generation duration described in human-friendly time, such as \"1h 30min\". By default, run until Ctrl+C")]
        duration: Option<String>,
        #[arg(short, long, default_value = None, help = "Output JSON file of the final report")]
        report: Option<String>,
    },
}
