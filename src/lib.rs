#![allow(clippy::result_large_err, clippy::too_many_arguments)]
#![deny(
  clippy::cast_lossless,
  clippy::cast_possible_truncation,
  clippy::cast_possible_wrap,
  clippy::cast_sign_loss
)]

use {
  self::{
    arguments::Arguments,
    chain_client::BlockStamp,
    error::{ResultExt, SnafuError},
    settings::Settings,
    subcommand::{OutputFormat, Subcommand, SubcommandResult},
    wallet::Credit,
  },
  anyhow::{anyhow, bail, ensure, Context, Error},
  bip39::Mnemonic,
  bitcoin::{
    absolute::LockTime,
    address::{Address, NetworkUnchecked},
    consensus,
    hashes::Hash,
    script,
    secp256k1::rand::{self, RngCore},
    transaction::Version,
    Amount, BlockHash, Network, OutPoint, PrivateKey, PubkeyHash, PublicKey, Script, ScriptBuf,
    Sequence, Transaction, TxIn, TxOut, Txid, Witness,
  },
  bitcoincore_rpc::{Client, RpcApi},
  clap::{ArgGroup, Parser},
  lazy_static::lazy_static,
  serde::{Deserialize, Serialize},
  snafu::{Backtrace, ErrorCompat, Snafu},
  std::{
    backtrace::BacktraceStatus,
    collections::{BTreeMap, BTreeSet},
    env,
    ffi::OsString,
    fmt::{self, Display, Formatter},
    fs::{self, File},
    io::{self, Read},
    net::SocketAddr,
    path::{Path, PathBuf},
    process,
    str::FromStr,
    sync::{
      atomic::{self, AtomicBool},
      Arc, Mutex, PoisonError, RwLock,
    },
    thread,
    time::Duration,
  },
  tokio::{runtime::Runtime, task},
};

pub use self::{
  bulletin::{Bulletin, BulletinRequest, DUST_AMOUNT},
  chain::Chain,
  chain_client::ChainClient,
  fee_rate::FeeRate,
  options::Options,
  wallet::Wallet,
};

#[macro_use]
mod macros;


#[cfg(test)]
use self::test::*;

pub mod arguments;
pub mod bulletin;
pub mod chain;
pub mod chain_client;
mod error;
pub mod fee_rate;
pub mod options;
pub mod settings;
pub mod subcommand;
pub mod wallet;

type Result<T = (), E = Error> = std::result::Result<T, E>;
type SnafuResult<T = (), E = SnafuError> = std::result::Result<T, E>;

static SHUTTING_DOWN: AtomicBool = AtomicBool::new(false);

lazy_static! {
  static ref LISTENERS: Mutex<Vec<axum_server::Handle>> = Mutex::new(Vec::new());
}

fn default<T: Default>() -> T {
  Default::default()
}

pub fn main() {
  env_logger::init();

  ctrlc::set_handler(move || {
    if SHUTTING_DOWN.fetch_or(true, atomic::Ordering::Relaxed) {
      process::exit(1);
    }

    eprintln!("Shutting down gracefully. Press <CTRL-C> again to shutdown immediately.");

    LISTENERS
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .for_each(|handle| handle.graceful_shutdown(Some(Duration::from_millis(100))));
  })
  .expect("Error setting <CTRL-C> handler");

  let args = Arguments::parse();

  let format = args.options.format;

  match args.run() {
    Err(err) => {
      eprintln!("error: {err}");

      if let SnafuError::Anyhow { err } = err {
        for (i, err) in err.chain().skip(1).enumerate() {
          if i == 0 {
            eprintln!();
            eprintln!("because:");
          }

          eprintln!("- {err}");
        }

        if env::var_os("RUST_BACKTRACE")
          .map(|val| val == "1")
          .unwrap_or_default()
        {
          eprintln!("{}", err.backtrace());
        }
      } else {
        for (i, err) in err.iter_chain().skip(1).enumerate() {
          if i == 0 {
            eprintln!();
            eprintln!("because:");
          }

          eprintln!("- {err}");
        }

        if let Some(backtrace) = err.backtrace() {
          if backtrace.status() == BacktraceStatus::Captured {
            eprintln!("backtrace:");
            eprintln!("{backtrace}");
          }
        }
      }

      process::exit(1);
    }
    Ok(output) => {
      if let Some(output) = output {
        output.print(format.unwrap_or_default());
      }
    }
  }
}
