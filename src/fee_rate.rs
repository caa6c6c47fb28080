use super::*;

pub(crate) const TX_OVERHEAD_ESTIMATE: usize = 4 + 1 + 1 + 4;
pub(crate) const TX_IN_ESTIMATE: usize = 32 + 4 + 1 + 107 + 4;
pub(crate) const TX_OUT_ESTIMATE: usize = 8 + 1 + 25;

const FREE_TX_SIZE_LIMIT: usize = 1000;
const FREE_TX_PRIORITY_THRESHOLD: u128 = 100_000_000 * 144 / 250;

/// Fee increment charged per started kilobyte of serialized transaction.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeeRate(#[serde(with = "bitcoin::amount::serde::as_sat")] Amount);

impl Default for FeeRate {
  fn default() -> Self {
    Self(Amount::from_sat(1000))
  }
}

impl FromStr for FeeRate {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::try_from(Amount::from_sat(
      s.parse::<u64>()
        .with_context(|| format!("invalid fee rate `{s}`"))?,
    ))
  }
}

impl TryFrom<Amount> for FeeRate {
  type Error = Error;

  fn try_from(increment: Amount) -> Result<Self, Self::Error> {
    ensure!(
      increment <= Amount::MAX_MONEY,
      "fee rate {} exceeds the money supply",
      increment.to_sat()
    );
    Ok(Self(increment))
  }
}

impl Display for FeeRate {
  fn fmt(&self, f: &mut Formatter) -> fmt::Result {
    write!(f, "{}", self.0.to_sat())
  }
}

impl FeeRate {
  pub fn increment(self) -> Amount {
    self.0
  }

  pub fn fee_for_size(self, size: usize) -> Amount {
    let kilobytes = u64::try_from(size / 1000)
      .unwrap_or(u64::MAX)
      .saturating_add(1);

    self
      .0
      .checked_mul(kilobytes)
      .map(|fee| fee.min(Amount::MAX_MONEY))
      .unwrap_or(Amount::MAX_MONEY)
  }

  /// Fee for a transaction of `size` bytes spending `inputs`, as seen at
  /// chain height `height`. Never below one increment unless free
  /// transactions are allowed.
  pub(crate) fn minimum_fee(
    self,
    size: usize,
    inputs: &[Credit],
    height: u32,
    allow_free: bool,
  ) -> Amount {
    if allow_free
      && size < FREE_TX_SIZE_LIMIT
      && priority(inputs, size, height) > FREE_TX_PRIORITY_THRESHOLD
    {
      return Amount::ZERO;
    }

    self.fee_for_size(size)
  }
}

pub(crate) fn estimate_size(inputs: usize, outputs: usize) -> usize {
  TX_OVERHEAD_ESTIMATE + TX_IN_ESTIMATE * inputs + TX_OUT_ESTIMATE * outputs
}

fn priority(inputs: &[Credit], size: usize, height: u32) -> u128 {
  if size == 0 {
    return 0;
  }

  let weighted = inputs
    .iter()
    .map(|credit| u128::from(credit.amount().to_sat()) * u128::from(credit.confirmations(height)))
    .sum::<u128>();

  weighted / u128::try_from(size).unwrap_or(u128::MAX)
}
