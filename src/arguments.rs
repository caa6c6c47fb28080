use super::*;

#[derive(Debug, Parser)]
#[command(
  version,
  about = "Fund, sign and broadcast on-chain bulletins from a local wallet"
)]
pub(crate) struct Arguments {
  #[command(flatten)]
  pub(crate) options: Options,
  #[command(subcommand)]
  pub(crate) subcommand: Subcommand,
}

impl Arguments {
  pub(crate) fn run(self) -> SnafuResult<Option<Box<dyn subcommand::Output>>> {
    let mut env: BTreeMap<String, String> = BTreeMap::new();

    for (variable, value) in env::vars_os() {
      let Some(variable) = variable.to_str() else {
        continue;
      };

      let Some(key) = variable.strip_prefix("BULLETIN_WALLET_") else {
        continue;
      };

      env.insert(
        key.into(),
        value.into_string().map_err(|value| SnafuError::EnvVarUnicode {
          backtrace: Backtrace::capture(),
          value,
          variable: variable.into(),
        })?,
      );
    }

    let settings = Settings::merge(self.options, env)?;

    Ok(self.subcommand.run(settings)?)
  }
}
