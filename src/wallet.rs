use {
  self::{
    credit::ScriptClass,
    database::Database,
    entry::{CreditValue, Entry, OutPointValue, TxidValue},
    keychain::Keychain,
    reservation::Reservation,
    signer::KeySource,
    transaction_builder::{Funded, TransactionBuilder},
  },
  super::*,
  std::sync::MutexGuard,
};

pub use self::{credit::Credit, error::Error};

mod credit;
mod database;
mod eligible;
mod entry;
mod error;
mod keychain;
mod reservation;
pub(crate) mod signer;
pub(crate) mod transaction_builder;

pub const MIN_PASSPHRASE_LEN: usize = 6;

const MINCONF: u32 = 1;

/// Proof that the caller holds the wallet's unlock credential. Released when
/// dropped.
pub(crate) struct HeldUnlock<'a>(#[allow(unused)] MutexGuard<'a, ()>);

/// A signed bulletin transaction whose inputs stay reserved until this value
/// is dropped.
#[derive(Debug)]
pub struct BuiltTransaction {
  pub fee: Amount,
  pub transaction: Transaction,
  reservation: Reservation,
  spent: Vec<Credit>,
}

impl BuiltTransaction {
  pub fn txid(&self) -> Txid {
    self.transaction.compute_txid()
  }

  pub fn raw_hex(&self) -> String {
    consensus::encode::serialize_hex(&self.transaction)
  }

  pub fn reserved(&self) -> &[OutPoint] {
    self.reservation.outpoints()
  }
}

pub struct Wallet {
  allow_free: bool,
  chain: Chain,
  database: Database,
  fee_rate: FeeRate,
  keychain: RwLock<Keychain>,
  reserved: Arc<Mutex<BTreeSet<OutPoint>>>,
  unlock: Mutex<()>,
}

pub(crate) fn check_passphrase(passphrase: &str) -> Result<(), Error> {
  if passphrase.len() < MIN_PASSPHRASE_LEN {
    return Err(Error::PassphraseTooShort {
      length: passphrase.len(),
    });
  }

  Ok(())
}

pub(crate) fn generate_mnemonic() -> Result<Mnemonic> {
  let mut entropy = [0; 16];
  rand::thread_rng().fill_bytes(&mut entropy);
  Ok(Mnemonic::from_entropy(&entropy)?)
}

impl Wallet {
  pub fn path(settings: &Settings) -> PathBuf {
    settings.data_dir().join("wallet.redb")
  }

  pub fn exists(settings: &Settings) -> bool {
    Self::path(settings).is_file()
  }

  pub fn create(settings: &Settings, passphrase: &str, mnemonic: &Mnemonic) -> Result<Self> {
    check_passphrase(passphrase)?;

    let data_dir = settings.data_dir();

    fs::create_dir_all(&data_dir).snafu_context(crate::error::Io { path: &data_dir })?;

    let mut keychain = Keychain::new(&mnemonic.to_seed(passphrase), settings.chain())?;

    let address = keychain.derive_next()?;

    let database = Database::create(&Self::path(settings), &mnemonic.to_entropy())?;

    database.insert_address(0, &address)?;

    log::info!("Created wallet with receive address {address}");

    Ok(Self::new(settings, database, keychain))
  }

  pub fn open(settings: &Settings) -> Result<Self> {
    let passphrase = settings
      .wallet_passphrase()
      .ok_or_else(|| {
        anyhow!(
          "wallet passphrase required: use --wallet-passphrase or BULLETIN_WALLET_WALLET_PASSPHRASE"
        )
      })?;

    let database = Database::open(&Self::path(settings))?;

    let mnemonic = Mnemonic::from_entropy(&database.entropy()?)?;

    let mut keychain = Keychain::new(&mnemonic.to_seed(passphrase), settings.chain())?;

    for (index, stored) in database.addresses()? {
      let derived = keychain.derive_next()?;

      ensure!(
        derived.to_string() == stored,
        "incorrect wallet passphrase: address {index} derives to {derived}, expected {stored}"
      );
    }

    ensure!(
      !keychain.addresses().is_empty(),
      "wallet database has no addresses"
    );

    log::info!(
      "Opened wallet with {} addresses and {} recorded transactions",
      keychain.addresses().len(),
      database.transaction_count()?,
    );

    Ok(Self::new(settings, database, keychain))
  }

  fn new(settings: &Settings, database: Database, keychain: Keychain) -> Self {
    Self {
      allow_free: settings.allow_free(),
      chain: settings.chain(),
      database,
      fee_rate: settings.fee_rate(),
      keychain: RwLock::new(keychain),
      reserved: default(),
      unlock: Mutex::new(()),
    }
  }

  pub fn chain(&self) -> Chain {
    self.chain
  }

  pub fn addresses(&self) -> Vec<Address> {
    self.keychain().addresses().to_vec()
  }

  pub fn new_address(&self) -> Result<Address> {
    let mut keychain = self
      .keychain
      .write()
      .unwrap_or_else(PoisonError::into_inner);

    let address = keychain.derive_next()?;

    let index = u32::try_from(keychain.addresses().len() - 1)?;

    self.database.insert_address(index, &address)?;

    Ok(address)
  }

  pub(crate) fn hold_unlock(&self) -> HeldUnlock<'_> {
    HeldUnlock(self.unlock.lock().unwrap_or_else(PoisonError::into_inner))
  }

  fn keychain(&self) -> std::sync::RwLockReadGuard<'_, Keychain> {
    self.keychain.read().unwrap_or_else(PoisonError::into_inner)
  }

  /// Refreshes the confirmed inventory from the chain server.
  pub fn sync(&self, chain: &dyn ChainClient) -> Result<usize> {
    let unspent = chain.scan_unspent(&self.addresses())?;

    let _unlock = self.hold_unlock();

    let merged = self.database.merge_unspent(unspent)?;

    log::info!("Synced {merged} unspent outputs from chain server");

    Ok(merged)
  }

  fn parse_address(&self, input: &str) -> Result<Address, Error> {
    input
      .parse::<Address<NetworkUnchecked>>()
      .map_err(|err| Error::InvalidAddress {
        input: input.into(),
        reason: err.to_string(),
      })?
      .require_network(self.chain.network())
      .map_err(|err| Error::InvalidAddress {
        input: input.into(),
        reason: err.to_string(),
      })
  }

  /// Selects inputs, funds, signs and validates a bulletin transaction. The
  /// spent outpoints stay reserved until the result is dropped.
  pub fn build_bulletin_transaction(
    &self,
    chain: &dyn ChainClient,
    request: &BulletinRequest,
  ) -> Result<BuiltTransaction, Error> {
    let unlock = self.hold_unlock();

    let address = self.parse_address(&request.address)?;

    let keychain = self.keychain();

    if !keychain.contains(&address.script_pubkey()) {
      return Err(Error::UnknownAddress { address });
    }

    let tip = chain
      .block_stamp()
      .map_err(|err| Error::ChainUnavailable {
        reason: err.to_string(),
      })?;

    let eligible = self.eligible_credits(&unlock, MINCONF, tip)?;

    let bulletin = Bulletin::new(&request.board, &request.message)
      .map_err(|source| Error::InvalidBulletin { source })?;

    let author = eligible::find_author_credit(&eligible, &address, self.chain.network())?;

    let mut pool = Vec::with_capacity(eligible.len().saturating_sub(1));
    let mut author_credit = None;
    for (i, credit) in eligible.into_iter().enumerate() {
      if i == author {
        author_credit = Some(credit);
      } else {
        pool.push(credit);
      }
    }

    let Some(author_credit) = author_credit else {
      return Err(Error::NoEligibleOutputForAddress { address });
    };

    log::debug!(
      "Building bulletin burning {} sat from {} with {} candidate inputs at height {}",
      bulletin.burn().to_sat(),
      author_credit.outpoint,
      pool.len(),
      tip.height,
    );

    let Funded {
      fee,
      inputs,
      transaction,
    } = TransactionBuilder::new(
      author_credit,
      pool,
      bulletin.tx_outs(),
      address.script_pubkey(),
      self.fee_rate,
      tip.height,
      self.allow_free,
    )
    .build_transaction(&*keychain)?;

    let reservation = Reservation::new(
      self.reserved.clone(),
      inputs.iter().map(|credit| credit.outpoint).collect(),
    );

    Ok(BuiltTransaction {
      fee,
      transaction,
      reservation,
      spent: inputs,
    })
  }

  /// Records a broadcast transaction: its inputs become debits and outputs
  /// paying the wallet become unconfirmed credits.
  pub fn insert_transaction(&self, built: &BuiltTransaction) -> Result<(), Error> {
    let txid = built.txid();

    let received = {
      let keychain = self.keychain();

      built
        .transaction
        .output
        .iter()
        .zip(0..)
        .filter(|(tx_out, _)| keychain.contains(&tx_out.script_pubkey))
        .map(|(tx_out, vout)| Credit {
          outpoint: OutPoint { txid, vout },
          tx_out: tx_out.clone(),
          height: None,
        })
        .collect()
    };

    let _unlock = self.hold_unlock();

    self
      .database
      .insert_transaction(&built.transaction, &built.spent, received)
      .map_err(Error::store)
  }

  /// Makes recorded transactions durable. Returns whether anything was
  /// flushed.
  pub fn flush(&self) -> Result<bool> {
    self.database.flush()
  }
}
