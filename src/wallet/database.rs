use {
  super::*,
  redb::{DatabaseError, Durability, ReadableTable, StorageError, TableDefinition},
  std::cmp,
};

const SCHEMA_VERSION: u64 = 1;

define_table! { ADDRESSES, u32, &str }
define_table! { CREDITS, OutPointValue, CreditValue }
define_table! { DEBITS, OutPointValue, TxidValue }
define_table! { SEED, (), &[u8] }
define_table! { STATISTICS, u64, u64 }
define_table! { TRANSACTIONS, TxidValue, &[u8] }

#[derive(Copy, Clone)]
pub(crate) enum Statistic {
  Schema = 0,
  Transactions = 1,
}

impl Statistic {
  fn key(self) -> u64 {
    self.into()
  }
}

impl From<Statistic> for u64 {
  fn from(statistic: Statistic) -> Self {
    statistic as u64
  }
}

pub(crate) struct Database {
  database: redb::Database,
  dirty: AtomicBool,
}

impl Database {
  pub(crate) fn create(path: &Path, entropy: &[u8]) -> Result<Self> {
    ensure!(
      !path.exists(),
      "wallet database `{}` already exists",
      path.display()
    );

    let database = redb::Database::create(path)
      .with_context(|| format!("failed to create wallet database `{}`", path.display()))?;

    let tx = database.begin_write()?;

    tx.open_table(ADDRESSES)?;
    tx.open_table(CREDITS)?;
    tx.open_table(DEBITS)?;
    tx.open_table(TRANSACTIONS)?;

    tx.open_table(SEED)?.insert((), entropy)?;

    {
      let mut statistics = tx.open_table(STATISTICS)?;
      statistics.insert(&Statistic::Schema.key(), &SCHEMA_VERSION)?;
      statistics.insert(&Statistic::Transactions.key(), &0)?;
    }

    tx.commit()?;

    Ok(Self {
      database,
      dirty: AtomicBool::new(false),
    })
  }

  pub(crate) fn open(path: &Path) -> Result<Self> {
    let database = match redb::Database::open(path) {
      Ok(database) => database,
      Err(DatabaseError::Storage(StorageError::Io(error)))
        if error.kind() == io::ErrorKind::NotFound =>
      {
        bail!("wallet database `{}` does not exist", path.display())
      }
      Err(error) => bail!("failed to open wallet database: {error}"),
    };

    let schema_version = database
      .begin_read()?
      .open_table(STATISTICS)?
      .get(&Statistic::Schema.key())?
      .map(|x| x.value())
      .unwrap_or(0);

    match schema_version.cmp(&SCHEMA_VERSION) {
      cmp::Ordering::Less => bail!(
        "wallet database at `{}` was created by an older, incompatible version: \
        wallet schema {schema_version}, expected {SCHEMA_VERSION}",
        path.display()
      ),
      cmp::Ordering::Greater => bail!(
        "wallet database at `{}` was created by a newer, incompatible version: \
        wallet schema {schema_version}, expected {SCHEMA_VERSION}",
        path.display()
      ),
      cmp::Ordering::Equal => {}
    }

    Ok(Self {
      database,
      dirty: AtomicBool::new(false),
    })
  }

  pub(crate) fn entropy(&self) -> Result<Vec<u8>> {
    Ok(
      self
        .database
        .begin_read()?
        .open_table(SEED)?
        .get(())?
        .ok_or_else(|| anyhow!("wallet database has no seed"))?
        .value()
        .to_vec(),
    )
  }

  pub(crate) fn addresses(&self) -> Result<Vec<(u32, String)>> {
    self
      .database
      .begin_read()?
      .open_table(ADDRESSES)?
      .iter()?
      .map(|result| {
        result
          .map(|(index, address)| (index.value(), address.value().to_string()))
          .map_err(Into::into)
      })
      .collect()
  }

  pub(crate) fn insert_address(&self, index: u32, address: &Address) -> Result {
    let tx = self.database.begin_write()?;

    tx.open_table(ADDRESSES)?
      .insert(index, address.to_string().as_str())?;

    tx.commit()?;

    Ok(())
  }

  /// Every credit not yet debited, in ascending outpoint order.
  pub(crate) fn credits(&self) -> Result<Vec<Credit>> {
    self
      .database
      .begin_read()?
      .open_table(CREDITS)?
      .iter()?
      .map(|result| {
        result
          .map(|(outpoint, value)| Credit::load((outpoint.value(), value.value())))
          .map_err(Into::into)
      })
      .collect()
  }

  #[cfg(test)]
  pub(crate) fn spent_by(&self, outpoint: OutPoint) -> Result<Option<Txid>> {
    Ok(
      self
        .database
        .begin_read()?
        .open_table(DEBITS)?
        .get(&outpoint.store())?
        .map(|txid| Txid::load(txid.value())),
    )
  }

  #[cfg(test)]
  pub(crate) fn transaction(&self, txid: Txid) -> Result<Option<Transaction>> {
    self
      .database
      .begin_read()?
      .open_table(TRANSACTIONS)?
      .get(&txid.store())?
      .map(|transaction| Ok(consensus::deserialize(transaction.value())?))
      .transpose()
  }

  pub(crate) fn transaction_count(&self) -> Result<u64> {
    Ok(
      self
        .database
        .begin_read()?
        .open_table(STATISTICS)?
        .get(&Statistic::Transactions.key())?
        .map(|x| x.value())
        .unwrap_or(0),
    )
  }

  /// Replaces the confirmed part of the inventory with `unspent`, keeping
  /// unconfirmed credits and skipping outputs already debited.
  pub(crate) fn merge_unspent(&self, unspent: Vec<Credit>) -> Result<usize> {
    let tx = self.database.begin_write()?;

    let merged = {
      let debits = tx.open_table(DEBITS)?;
      let mut credits = tx.open_table(CREDITS)?;

      let scanned = unspent
        .iter()
        .map(|credit| credit.outpoint.store())
        .collect::<BTreeSet<OutPointValue>>();

      let mut stale = Vec::new();
      for result in credits.iter()? {
        let (outpoint, value) = result?;
        let outpoint = outpoint.value();
        let (_, _, height) = value.value();
        if height.is_some() && !scanned.contains(&outpoint) {
          stale.push(outpoint);
        }
      }

      for outpoint in stale {
        credits.remove(&outpoint)?;
      }

      let mut merged = 0;
      for credit in unspent {
        let (outpoint, value) = credit.store();

        if debits.get(&outpoint)?.is_some() {
          continue;
        }

        credits.insert(&outpoint, value)?;
        merged += 1;
      }

      merged
    };

    tx.commit()?;

    Ok(merged)
  }

  /// Records `transaction` as spending `spent` and paying `received` back to
  /// the wallet. The commit is not durable until the next `flush`.
  pub(crate) fn insert_transaction(
    &self,
    transaction: &Transaction,
    spent: &[Credit],
    received: Vec<Credit>,
  ) -> Result {
    let txid = transaction.compute_txid();

    let mut tx = self.database.begin_write()?;

    tx.set_durability(Durability::None);

    {
      let mut transactions = tx.open_table(TRANSACTIONS)?;

      ensure!(
        transactions.get(&txid.store())?.is_none(),
        "transaction {txid} already recorded"
      );

      transactions.insert(&txid.store(), consensus::serialize(transaction).as_slice())?;

      let mut credits = tx.open_table(CREDITS)?;
      let mut debits = tx.open_table(DEBITS)?;

      for credit in spent {
        let outpoint = credit.outpoint.store();
        credits.remove(&outpoint)?;
        debits.insert(&outpoint, &txid.store())?;
      }

      for credit in received {
        let (outpoint, value) = credit.store();
        credits.insert(&outpoint, value)?;
      }

      let mut statistics = tx.open_table(STATISTICS)?;
      let count = statistics
        .get(&Statistic::Transactions.key())?
        .map(|x| x.value())
        .unwrap_or(0);
      statistics.insert(&Statistic::Transactions.key(), &(count + 1))?;
    }

    tx.commit()?;

    self.dirty.store(true, atomic::Ordering::Relaxed);

    Ok(())
  }

  #[cfg(test)]
  pub(crate) fn is_dirty(&self) -> bool {
    self.dirty.load(atomic::Ordering::Relaxed)
  }

  /// Makes earlier non-durable commits durable. Returns whether anything was
  /// flushed.
  pub(crate) fn flush(&self) -> Result<bool> {
    if !self.dirty.swap(false, atomic::Ordering::Relaxed) {
      return Ok(false);
    }

    let result = self
      .database
      .begin_write()
      .map_err(anyhow::Error::from)
      .and_then(|tx| tx.commit().map_err(anyhow::Error::from));

    if let Err(err) = result {
      self.dirty.store(true, atomic::Ordering::Relaxed);
      return Err(err);
    }

    Ok(true)
  }
}
