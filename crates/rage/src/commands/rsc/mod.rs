pub mod info;

#[derive(clap::Subcommand)]
pub enum RscCommands {
    /// Print the header and page layout of a resource
    Info(info::InfoArgs),
}

impl RscCommands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            RscCommands::Info(info) => info.handle(),
        }
    }
}
