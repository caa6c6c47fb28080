use super::*;

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct Output {
  pub address: String,
  pub mnemonic: Mnemonic,
}

#[derive(Debug, Parser)]
pub(crate) struct Create {
  #[arg(
    long,
    help = "Derive keys with BIP39 <PASSPHRASE>. [default: --wallet-passphrase]"
  )]
  passphrase: Option<String>,
  #[arg(long, help = "Restore wallet from <MNEMONIC> instead of generating one.")]
  mnemonic: Option<Mnemonic>,
}

impl Create {
  pub(crate) fn run(self, settings: Settings) -> SubcommandResult {
    let passphrase = self
      .passphrase
      .as_deref()
      .or(settings.wallet_passphrase())
      .ok_or_else(|| anyhow!("no passphrase given: use --passphrase or --wallet-passphrase"))?;

    wallet::check_passphrase(passphrase)?;

    ensure!(
      !Wallet::exists(&settings),
      "wallet already exists at `{}`",
      Wallet::path(&settings).display()
    );

    let mnemonic = match self.mnemonic {
      Some(mnemonic) => mnemonic,
      None => wallet::generate_mnemonic()?,
    };

    let wallet = Wallet::create(&settings, passphrase, &mnemonic)?;

    Ok(Some(Box::new(Output {
      address: wallet.addresses()[0].to_string(),
      mnemonic,
    })))
  }
}
