pub mod rpf;
pub mod rsc;

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Handle RPF archives
    Rpf {
        #[command(subcommand)]
        command: rpf::RpfCommands,
    },
    /// Inspect RSC7 resources
    Rsc {
        #[command(subcommand)]
        command: rsc::RscCommands,
    },
}

impl Commands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            Commands::Rpf { command } => command.handle(),
            Commands::Rsc { command } => command.handle(),
        }
    }
}
