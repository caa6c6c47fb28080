use super::*;

#[derive(Serialize, Eq, PartialEq, Deserialize, Debug)]
pub struct Output {
  pub txid: Txid,
  pub board: String,
  pub message: String,
  pub author: Option<String>,
}

#[derive(Debug, Parser)]
pub(crate) struct Decode {
  #[arg(help = "Decode hex-encoded <TRANSACTION>. [default: read from stdin]")]
  transaction: Option<String>,
}

impl Decode {
  pub(crate) fn run(self, settings: Settings) -> SubcommandResult {
    let hex = match self.transaction {
      Some(transaction) => transaction,
      None => {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
      }
    };

    Ok(Some(Box::new(Self::decode(hex.trim(), settings.chain())?)))
  }

  fn decode(hex: &str, chain: Chain) -> Result<Output> {
    let bytes = hex::decode(hex).context("transaction is not valid hex")?;

    let transaction: Transaction =
      consensus::deserialize(&bytes).context("failed to decode transaction")?;

    let bulletin = Bulletin::from_transaction(&transaction)?;

    Ok(Output {
      txid: transaction.compute_txid(),
      board: bulletin.board,
      message: bulletin.message,
      author: Bulletin::author(&transaction, chain.network()).map(|address| address.to_string()),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decode_signed_bulletin() {
    let bulletin = Bulletin::new("ombuds", "hello world").unwrap();

    let funded = wallet::transaction_builder::TransactionBuilder::new(
      credit(1, 100_000, 1, Some(100)),
      Vec::new(),
      bulletin.tx_outs(),
      p2pkh(1),
      FeeRate::default(),
      100,
      false,
    )
    .build_transaction(&keys())
    .unwrap();

    pretty_assert_eq!(
      Decode::decode(
        &consensus::encode::serialize_hex(&funded.transaction),
        Chain::Regtest
      )
      .unwrap(),
      Output {
        txid: funded.transaction.compute_txid(),
        board: "ombuds".into(),
        message: "hello world".into(),
        author: Some(address(1).to_string()),
      }
    );
  }

  #[test]
  fn invalid_hex() {
    assert_eq!(
      Decode::decode("xyz", Chain::Regtest).unwrap_err().to_string(),
      "transaction is not valid hex"
    );
  }

  #[test]
  fn not_a_bulletin() {
    let transaction = Transaction {
      version: Version::ONE,
      lock_time: LockTime::ZERO,
      input: vec![TxIn {
        previous_output: outpoint(1),
        script_sig: ScriptBuf::new(),
        sequence: Sequence::MAX,
        witness: Witness::new(),
      }],
      output: vec![tx_out(1000, ScriptBuf::new())],
    };

    assert_eq!(
      Decode::decode(&consensus::encode::serialize_hex(&transaction), Chain::Regtest)
        .unwrap_err()
        .to_string(),
      "transaction does not carry a bulletin"
    );
  }
}
