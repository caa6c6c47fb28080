//! Bulletin transactions carry a fixed set of payload outputs and pay for
//! them, plus the fee, entirely out of the wallet's eligible credits.
//!
//! `TransactionBuilder::new` takes the authoring credit, which always becomes
//! the first input, the remaining eligible credits, the payload outputs and the
//! change script. `TransactionBuilder::build_transaction` then runs a series of
//! transformations, each responsible for one concern:
//!
//! - `cover_burn` adds inputs, largest first, until the payload is paid for.
//! - `estimate_fee` sizes the transaction from input and output counts.
//! - `cover_fee` adds inputs until the fee estimate is paid for as well.
//! - `converge` signs, measures the real serialized size, and raises the fee
//!   estimate one increment at a time until it covers that size.
//!
//! The fee estimate never decreases once convergence starts, and every
//! iteration either terminates or consumes more of the pool, so the loop is
//! finite. `finish` asserts the invariants of the final transaction and then
//! re-verifies every input script.

use {
  super::*,
  fee_rate::TX_IN_ESTIMATE,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Funded {
  pub fee: Amount,
  pub inputs: Vec<Credit>,
  pub transaction: Transaction,
}

#[derive(Debug)]
pub(crate) struct TransactionBuilder {
  allow_free: bool,
  change: ScriptBuf,
  fee_estimate: Amount,
  fee_rate: FeeRate,
  height: u32,
  inputs: Vec<Credit>,
  next: usize,
  payload: Vec<TxOut>,
  pool: Vec<Credit>,
  size_estimate: usize,
  total_burn: Amount,
  total_in: Amount,
}

type Result<T> = std::result::Result<T, Error>;

impl TransactionBuilder {
  const MAX_ITERATIONS: usize = 1000;

  pub(crate) fn new(
    author: Credit,
    mut pool: Vec<Credit>,
    payload: Vec<TxOut>,
    change: ScriptBuf,
    fee_rate: FeeRate,
    height: u32,
    allow_free: bool,
  ) -> Self {
    pool.sort_by(|a, b| {
      b.amount()
        .cmp(&a.amount())
        .then_with(|| a.outpoint.cmp(&b.outpoint))
    });

    let total_burn = payload.iter().map(|tx_out| tx_out.value).sum();

    Self {
      allow_free,
      change,
      fee_estimate: Amount::ZERO,
      fee_rate,
      height,
      total_in: author.amount(),
      inputs: vec![author],
      next: 0,
      payload,
      pool,
      size_estimate: 0,
      total_burn,
    }
  }

  pub(crate) fn build_transaction(self, keys: &impl KeySource) -> Result<Funded> {
    self
      .cover_burn()?
      .estimate_fee()
      .cover_fee()?
      .converge(keys)
  }

  fn cover_burn(mut self) -> Result<Self> {
    while self.total_in < self.total_burn {
      if !self.add_input() {
        return Err(self.insufficient_funds(Amount::ZERO));
      }
    }

    Ok(self)
  }

  fn estimate_fee(mut self) -> Self {
    self.size_estimate = fee_rate::estimate_size(self.inputs.len(), self.payload.len());
    self.fee_estimate = self.minimum_fee();

    tprintln!(
      "estimated {} bytes for {} inputs, fee {}",
      self.size_estimate,
      self.inputs.len(),
      self.fee_estimate.to_sat()
    );

    self
  }

  fn cover_fee(mut self) -> Result<Self> {
    while self.total_in < self.total_burn + self.fee_estimate {
      if !self.add_input() {
        return Err(self.insufficient_funds(self.fee_estimate));
      }

      self.size_estimate += TX_IN_ESTIMATE;
      self.fee_estimate = self.minimum_fee();
    }

    Ok(self)
  }

  fn top_up(mut self) -> Result<Self> {
    while self.total_in < self.total_burn + self.fee_estimate {
      if !self.add_input() {
        return Err(self.insufficient_funds(self.fee_estimate));
      }

      self.size_estimate += TX_IN_ESTIMATE;
      self.fee_estimate = self.fee_estimate.max(self.minimum_fee());
    }

    Ok(self)
  }

  fn converge(mut self, keys: &impl KeySource) -> Result<Funded> {
    let mut iterations = 0;

    loop {
      assert!(
        iterations < Self::MAX_ITERATIONS,
        "invariant: fee estimate converges"
      );

      iterations += 1;

      let mut transaction = self.unsigned_transaction();

      signer::sign_transaction(&mut transaction, &self.prevouts(), keys)?;

      let required = self.fee_rate.fee_for_size(transaction.total_size());

      tprintln!(
        "signed {} bytes, fee required {}, estimated {}",
        transaction.total_size(),
        required.to_sat(),
        self.fee_estimate.to_sat()
      );

      if required <= self.fee_estimate {
        return self.finish(transaction);
      }

      self.fee_estimate += self.fee_rate.increment();

      self = self.top_up()?;
    }
  }

  fn finish(self, transaction: Transaction) -> Result<Funded> {
    let total_out = transaction
      .output
      .iter()
      .map(|tx_out| tx_out.value)
      .sum::<Amount>();

    assert_eq!(
      self
        .inputs
        .iter()
        .map(|credit| credit.outpoint)
        .collect::<BTreeSet<OutPoint>>()
        .len(),
      self.inputs.len(),
      "invariant: inputs are distinct",
    );

    assert_eq!(
      transaction.input[0].previous_output, self.inputs[0].outpoint,
      "invariant: authoring credit is the first input",
    );

    assert_eq!(
      transaction.output[..self.payload.len()],
      self.payload,
      "invariant: payload outputs come first and in order",
    );

    assert!(
      transaction.output.len() <= self.payload.len() + 1,
      "invariant: at most one change output",
    );

    if let Some(change) = transaction.output.get(self.payload.len()) {
      assert!(
        change.value > Amount::ZERO,
        "invariant: change output is positive",
      );
      assert_eq!(
        change.script_pubkey, self.change,
        "invariant: change pays the authoring address",
      );
    }

    assert_eq!(
      self.total_in.checked_sub(total_out),
      Some(self.fee_estimate),
      "invariant: inputs pay for outputs plus the fee estimate",
    );

    assert!(
      self.fee_rate.fee_for_size(transaction.total_size()) <= self.fee_estimate,
      "invariant: fee estimate covers the actual size",
    );

    signer::validate_transaction(&transaction, &self.prevouts())?;

    Ok(Funded {
      fee: self.fee_estimate,
      inputs: self.inputs,
      transaction,
    })
  }

  fn add_input(&mut self) -> bool {
    let Some(credit) = self.pool.get(self.next) else {
      return false;
    };

    tprintln!(
      "selected {} worth {}",
      credit.outpoint,
      credit.amount().to_sat()
    );

    self.total_in += credit.amount();
    self.inputs.push(credit.clone());
    self.next += 1;

    true
  }

  fn minimum_fee(&self) -> Amount {
    self
      .fee_rate
      .minimum_fee(self.size_estimate, &self.inputs, self.height, self.allow_free)
  }

  fn unsigned_transaction(&self) -> Transaction {
    let change = self
      .total_in
      .checked_sub(self.total_burn + self.fee_estimate)
      .expect("invariant: inputs cover burn and fee");

    let mut output = self.payload.clone();

    if change > Amount::ZERO {
      output.push(TxOut {
        value: change,
        script_pubkey: self.change.clone(),
      });
    }

    Transaction {
      version: Version::ONE,
      lock_time: LockTime::ZERO,
      input: self
        .inputs
        .iter()
        .map(|credit| TxIn {
          previous_output: credit.outpoint,
          script_sig: ScriptBuf::new(),
          sequence: Sequence::MAX,
          witness: Witness::new(),
        })
        .collect(),
      output,
    }
  }

  fn prevouts(&self) -> Vec<TxOut> {
    self
      .inputs
      .iter()
      .map(|credit| credit.tx_out.clone())
      .collect()
  }

  fn insufficient_funds(&self, fee: Amount) -> Error {
    Error::InsufficientFunds {
      have: self.total_in,
      needed: self.total_burn,
      fee,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn builder(author: u64, pool: &[u64], bulletin: &Bulletin) -> TransactionBuilder {
    TransactionBuilder::new(
      credit(1, author, 1, Some(100)),
      pool
        .iter()
        .zip(2..)
        .map(|(value, n)| credit(n, *value, 2, Some(100)))
        .collect(),
      bulletin.tx_outs(),
      p2pkh(1),
      FeeRate::default(),
      100,
      false,
    )
  }

  fn build(author: u64, pool: &[u64], bulletin: &Bulletin) -> Result<Funded> {
    builder(author, pool, bulletin).build_transaction(&keys())
  }

  fn hello() -> Bulletin {
    Bulletin::new("ombuds", "hello world").unwrap()
  }

  fn long() -> Bulletin {
    Bulletin::new("b", &"x".repeat(460)).unwrap()
  }

  fn outpoints(funded: &Funded) -> Vec<OutPoint> {
    funded
      .transaction
      .input
      .iter()
      .map(|tx_in| tx_in.previous_output)
      .collect()
  }

  #[test]
  fn single_input_with_change() {
    let funded = build(100_000, &[], &hello()).unwrap();

    assert_eq!(funded.fee, Amount::from_sat(1000));
    assert_eq!(outpoints(&funded), [outpoint(1)]);

    let output = &funded.transaction.output;
    assert_eq!(output.len(), 3);
    assert_eq!(output[..2], hello().tx_outs());
    assert_eq!(output[2], tx_out(97_800, p2pkh(1)));

    assert_eq!(
      FeeRate::default().fee_for_size(funded.transaction.total_size()),
      funded.fee
    );

    assert_eq!(Bulletin::from_transaction(&funded.transaction).unwrap(), hello());
  }

  #[test]
  fn exact_funds_produce_no_change() {
    let funded = build(2200, &[], &hello()).unwrap();

    assert_eq!(funded.fee, Amount::from_sat(1000));
    assert_eq!(funded.transaction.output, hello().tx_outs());
  }

  #[test]
  fn insufficient_funds_for_payload() {
    assert_eq!(
      build(500, &[300], &hello()),
      Err(Error::InsufficientFunds {
        have: Amount::from_sat(800),
        needed: Amount::from_sat(1200),
        fee: Amount::ZERO,
      })
    );
  }

  #[test]
  fn insufficient_funds_for_fee() {
    assert_eq!(
      build(1000, &[300], &hello()),
      Err(Error::InsufficientFunds {
        have: Amount::from_sat(1300),
        needed: Amount::from_sat(1200),
        fee: Amount::from_sat(1000),
      })
    );
  }

  #[test]
  fn author_is_first_and_pool_is_largest_first() {
    let funded = build(1000, &[5000, 20_000, 700], &hello()).unwrap();

    assert_eq!(outpoints(&funded), [outpoint(1), outpoint(3)]);
    assert_eq!(
      funded.transaction.output[2],
      tx_out(18_800, p2pkh(1))
    );
    assert_eq!(funded.inputs.len(), 2);
  }

  #[test]
  fn equal_amounts_are_taken_in_outpoint_order() {
    let funded = build(1000, &[700, 700], &hello()).unwrap();

    assert_eq!(outpoints(&funded), [outpoint(1), outpoint(2), outpoint(3)]);
    assert_eq!(funded.transaction.output[2], tx_out(200, p2pkh(1)));
  }

  #[test]
  fn change_crossing_size_boundary_raises_fee() {
    let funded = build(100_000, &[], &long()).unwrap();

    assert_eq!(funded.transaction.output.len(), 25);
    assert_eq!(funded.fee, Amount::from_sat(2000));
    assert_eq!(funded.transaction.output[24], tx_out(83_600, p2pkh(1)));
    assert!(funded.transaction.total_size() >= 1000);
  }

  #[test]
  fn raised_fee_can_exhaust_funds() {
    assert_eq!(
      build(15_401, &[], &long()),
      Err(Error::InsufficientFunds {
        have: Amount::from_sat(15_401),
        needed: Amount::from_sat(14_400),
        fee: Amount::from_sat(2000),
      })
    );
  }

  #[test]
  fn raised_fee_is_topped_up_from_pool() {
    let funded = build(15_401, &[5000], &long()).unwrap();

    assert_eq!(outpoints(&funded), [outpoint(1), outpoint(2)]);
    assert_eq!(funded.fee, Amount::from_sat(2000));
    assert_eq!(funded.transaction.output[24], tx_out(4001, p2pkh(1)));
  }

  #[test]
  fn no_change_below_size_boundary() {
    let funded = build(15_400, &[], &long()).unwrap();

    assert_eq!(funded.fee, Amount::from_sat(1000));
    assert_eq!(funded.transaction.output, long().tx_outs());
  }

  #[test]
  fn builds_are_deterministic() {
    assert_eq!(
      build(100_000, &[5000], &hello()).unwrap(),
      build(100_000, &[5000], &hello()).unwrap()
    );
  }

  #[test]
  fn pool_is_not_consulted_when_author_suffices() {
    let funded = build(100_000, &[1_000_000], &hello()).unwrap();

    assert_eq!(outpoints(&funded), [outpoint(1)]);
  }

  #[test]
  fn fee_estimate_is_monotonic_during_convergence() {
    let builder = builder(100_000, &[], &long())
      .cover_burn()
      .unwrap()
      .estimate_fee()
      .cover_fee()
      .unwrap();

    assert_eq!(builder.fee_estimate, Amount::from_sat(1000));
    assert_eq!(builder.size_estimate, 974);

    let funded = builder.converge(&keys()).unwrap();

    assert_eq!(funded.fee, Amount::from_sat(2000));
  }

  #[test]
  fn missing_key_aborts_build() {
    let mut author = credit(1, 100_000, 1, Some(100));
    author.tx_out.script_pubkey = p2pkh(9);

    assert_matches!(
      TransactionBuilder::new(
        author,
        Vec::new(),
        hello().tx_outs(),
        p2pkh(1),
        FeeRate::default(),
        100,
        false,
      )
      .build_transaction(&keys()),
      Err(Error::SigningFailed { input: 0, .. })
    );
  }

  #[test]
  #[should_panic(expected = "invariant: inputs pay for outputs plus the fee estimate")]
  fn invariant_fee_mismatch() {
    let mut builder = builder(100_000, &[], &hello())
      .cover_burn()
      .unwrap()
      .estimate_fee()
      .cover_fee()
      .unwrap();

    let mut transaction = builder.unsigned_transaction();

    builder.fee_estimate += Amount::from_sat(1);

    signer::sign_transaction(&mut transaction, &builder.prevouts(), &keys()).unwrap();

    builder.finish(transaction).unwrap();
  }

  #[test]
  #[should_panic(expected = "invariant: authoring credit is the first input")]
  fn invariant_author_first() {
    let mut builder = builder(1000, &[5000], &hello())
      .cover_burn()
      .unwrap()
      .estimate_fee()
      .cover_fee()
      .unwrap();

    builder.inputs.swap(0, 1);

    let mut transaction = builder.unsigned_transaction();
    signer::sign_transaction(&mut transaction, &builder.prevouts(), &keys()).unwrap();

    builder.inputs.swap(0, 1);

    builder.finish(transaction).unwrap();
  }
}
