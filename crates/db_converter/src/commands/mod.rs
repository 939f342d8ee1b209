pub mod format;
pub mod list;
pub mod pack;
pub mod unpack;

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Extract a DB archive into a directory
    Unpack(unpack::UnpackArgs),
    /// Build a DB archive from a directory
    Pack(pack::PackArgs),
    /// Print the directory table of a DB archive
    List(list::ListArgs),
}

impl Commands {
    pub fn handle(&self, debug: bool) -> miette::Result<()> {
        match self {
            Commands::Unpack(unpack) => unpack.handle(debug),
            Commands::Pack(pack) => pack.handle(debug),
            Commands::List(list) => list.handle(),
        }
    }
}
