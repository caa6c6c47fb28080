use {
  super::*,
  bitcoin::{consensus::Decodable, VarInt},
};

/// Value carried by every payload output.
pub const DUST_AMOUNT: Amount = Amount::from_sat(600);

pub const MAX_BOARD_LEN: usize = 30;
pub const MAX_MESSAGE_LEN: usize = 500;

const CHUNK_LEN: usize = 20;
const MAGIC: [u8; 4] = *b"BLTN";
const VERSION: u8 = 1;

#[derive(Debug, PartialEq, Snafu)]
#[snafu(context(suffix(false)), visibility(pub(crate)))]
pub enum Error {
  #[snafu(display("bulletin message is empty"))]
  EmptyMessage,
  #[snafu(display("bulletin message is {length} bytes, maximum is {MAX_MESSAGE_LEN}"))]
  MessageTooLong { length: usize },
  #[snafu(display("bulletin board is {length} bytes, maximum is {MAX_BOARD_LEN}"))]
  BoardTooLong { length: usize },
  #[snafu(display("transaction does not carry a bulletin"))]
  NotABulletin,
  #[snafu(display("unsupported bulletin version {version}"))]
  UnsupportedVersion { version: u8 },
  #[snafu(display("bulletin payload is truncated"))]
  Truncated,
  #[snafu(display("bulletin {field} is not valid UTF-8"))]
  Utf8 { field: &'static str },
}

/// A bulletin as submitted by a client, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulletinRequest {
  pub address: String,
  #[serde(default)]
  pub board: String,
  pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bulletin {
  pub board: String,
  pub message: String,
}

impl Bulletin {
  pub fn new(board: &str, message: &str) -> Result<Self, Error> {
    if message.is_empty() {
      return Err(Error::EmptyMessage);
    }

    if message.len() > MAX_MESSAGE_LEN {
      return Err(Error::MessageTooLong {
        length: message.len(),
      });
    }

    if board.len() > MAX_BOARD_LEN {
      return Err(Error::BoardTooLong {
        length: board.len(),
      });
    }

    Ok(Self {
      board: board.into(),
      message: message.into(),
    })
  }

  fn payload(&self) -> Vec<u8> {
    let mut payload = MAGIC.to_vec();
    payload.push(VERSION);

    for field in [&self.board, &self.message] {
      payload.extend(consensus::serialize(&VarInt::from(field.len())));
      payload.extend(field.as_bytes());
    }

    payload
  }

  /// Payload outputs in order. The encoding is deterministic, so the same
  /// bulletin always yields the same outputs.
  pub fn tx_outs(&self) -> Vec<TxOut> {
    self
      .payload()
      .chunks(CHUNK_LEN)
      .map(|chunk| {
        let mut hash = [0; CHUNK_LEN];
        hash[..chunk.len()].copy_from_slice(chunk);
        TxOut {
          value: DUST_AMOUNT,
          script_pubkey: ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash)),
        }
      })
      .collect()
  }

  pub fn burn(&self) -> Amount {
    self
      .tx_outs()
      .iter()
      .map(|tx_out| tx_out.value)
      .sum()
  }

  pub fn from_transaction(transaction: &Transaction) -> Result<Self, Error> {
    let payload = transaction
      .output
      .iter()
      .map_while(|tx_out| {
        tx_out
          .script_pubkey
          .is_p2pkh()
          .then(|| &tx_out.script_pubkey.as_bytes()[3..23])
      })
      .flatten()
      .copied()
      .collect::<Vec<u8>>();

    let Some(rest) = payload.strip_prefix(&MAGIC) else {
      return Err(Error::NotABulletin);
    };

    let Some((&version, mut rest)) = rest.split_first() else {
      return Err(Error::Truncated);
    };

    if version != VERSION {
      return Err(Error::UnsupportedVersion { version });
    }

    let board = read_string(&mut rest, "board")?;
    let message = read_string(&mut rest, "message")?;

    Ok(Self { board, message })
  }

  /// The P2PKH address whose key signed the first input, if any.
  pub fn author(transaction: &Transaction, network: Network) -> Option<Address> {
    let script_sig = &transaction.input.first()?.script_sig;

    let public_key = script_sig
      .instructions()
      .nth(1)?
      .ok()?
      .push_bytes()
      .and_then(|bytes| PublicKey::from_slice(bytes.as_bytes()).ok())?;

    Some(Address::p2pkh(public_key, network))
  }
}

fn read_string(input: &mut &[u8], field: &'static str) -> Result<String, Error> {
  let VarInt(length) = VarInt::consensus_decode(input).map_err(|_| Error::Truncated)?;

  let length = usize::try_from(length).map_err(|_| Error::Truncated)?;

  if input.len() < length {
    return Err(Error::Truncated);
  }

  let (bytes, rest) = input.split_at(length);
  *input = rest;

  String::from_utf8(bytes.to_vec()).map_err(|_| Error::Utf8 { field })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn transaction(output: Vec<TxOut>) -> Transaction {
    Transaction {
      version: Version::ONE,
      lock_time: LockTime::ZERO,
      input: Vec::new(),
      output,
    }
  }

  #[test]
  fn validation() {
    assert_eq!(Bulletin::new("ombuds", ""), Err(Error::EmptyMessage));
    assert_eq!(
      Bulletin::new("ombuds", &"a".repeat(501)),
      Err(Error::MessageTooLong { length: 501 })
    );
    assert_eq!(
      Bulletin::new(&"b".repeat(31), "hello"),
      Err(Error::BoardTooLong { length: 31 })
    );
    assert!(Bulletin::new(&"b".repeat(30), &"a".repeat(500)).is_ok());
    assert!(Bulletin::new("", "hello").is_ok());
  }

  #[test]
  fn message_length_is_measured_in_bytes() {
    assert_eq!(
      Bulletin::new("", &"é".repeat(251)),
      Err(Error::MessageTooLong { length: 502 })
    );
  }

  #[test]
  fn payload_layout() {
    let bulletin = Bulletin::new("ombuds", "hello world").unwrap();

    let mut expected = b"BLTN\x01\x06ombuds\x0bhello world".to_vec();
    assert_eq!(bulletin.payload(), expected);

    expected.resize(40, 0);

    let tx_outs = bulletin.tx_outs();
    assert_eq!(tx_outs.len(), 2);

    for (tx_out, chunk) in tx_outs.iter().zip(expected.chunks(20)) {
      assert_eq!(tx_out.value, DUST_AMOUNT);
      assert!(tx_out.script_pubkey.is_p2pkh());
      assert_eq!(&tx_out.script_pubkey.as_bytes()[3..23], chunk);
    }

    assert_eq!(bulletin.burn(), Amount::from_sat(1200));
  }

  #[test]
  fn tx_outs_are_deterministic() {
    let a = Bulletin::new("board", "message").unwrap();
    let b = Bulletin::new("board", "message").unwrap();
    assert_eq!(a.tx_outs(), b.tx_outs());
  }

  #[test]
  fn decode_ignores_trailing_outputs() {
    let bulletin = Bulletin::new("ombuds", "hello world").unwrap();

    let mut output = bulletin.tx_outs();
    output.push(tx_out(97_800, p2pkh(1)));

    assert_eq!(
      Bulletin::from_transaction(&transaction(output)).unwrap(),
      bulletin
    );
  }

  #[test]
  fn decode_long_message() {
    let bulletin = Bulletin::new("b", &"x".repeat(460)).unwrap();

    assert_eq!(bulletin.tx_outs().len(), 24);

    assert_eq!(
      Bulletin::from_transaction(&transaction(bulletin.tx_outs())).unwrap(),
      bulletin
    );
  }

  #[test]
  fn decode_errors() {
    assert_eq!(
      Bulletin::from_transaction(&transaction(vec![tx_out(600, p2pkh(1))])),
      Err(Error::NotABulletin)
    );

    assert_eq!(
      Bulletin::from_transaction(&transaction(Vec::new())),
      Err(Error::NotABulletin)
    );

    let mut chunk = [0; 20];
    chunk[..5].copy_from_slice(b"BLTN\x02");
    assert_eq!(
      Bulletin::from_transaction(&transaction(vec![tx_out(
        600,
        ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(chunk))
      )])),
      Err(Error::UnsupportedVersion { version: 2 })
    );

    let mut chunk = [0; 20];
    chunk[..7].copy_from_slice(b"BLTN\x01\x00\x30");
    assert_eq!(
      Bulletin::from_transaction(&transaction(vec![tx_out(
        600,
        ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(chunk))
      )])),
      Err(Error::Truncated)
    );
  }

  #[test]
  fn request_board_defaults_to_empty() {
    let request: BulletinRequest =
      serde_json::from_str(r#"{"address": "foo", "message": "bar"}"#).unwrap();

    assert_eq!(request.board, "");
  }
}
