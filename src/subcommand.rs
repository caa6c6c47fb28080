use super::*;

pub mod create;
pub mod decode;
pub mod server;

#[derive(Debug, Parser)]
pub(crate) enum Subcommand {
  #[command(about = "Create a new wallet from the terminal")]
  Create(create::Create),
  #[command(about = "Decode a bulletin from a raw transaction")]
  Decode(decode::Decode),
  #[command(about = "Run the wallet JSON-RPC server")]
  Server(server::Server),
}

impl Subcommand {
  pub(crate) fn run(self, settings: Settings) -> SubcommandResult {
    match self {
      Self::Create(create) => create.run(settings),
      Self::Decode(decode) => decode.run(settings),
      Self::Server(server) => server.run(settings),
    }
  }
}

pub(crate) trait Output: Send {
  fn print(&self, format: OutputFormat);
}

impl<T> Output for T
where
  T: Serialize + Send,
{
  fn print(&self, format: OutputFormat) {
    match format {
      OutputFormat::Json => serde_json::to_writer_pretty(io::stdout(), self).ok(),
      OutputFormat::Yaml => serde_yaml::to_writer(io::stdout(), self).ok(),
      OutputFormat::Minify => serde_json::to_writer(io::stdout(), self).ok(),
    };
    println!();
  }
}

pub(crate) type SubcommandResult = Result<Option<Box<dyn Output>>>;

#[derive(Debug, Default, Clone, Copy, PartialEq, clap::ValueEnum)]
pub enum OutputFormat {
  #[default]
  Json,
  Yaml,
  Minify,
}
