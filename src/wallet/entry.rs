use super::*;

pub(crate) trait Entry: Sized {
  type Value;

  fn load(value: Self::Value) -> Self;

  fn store(self) -> Self::Value;
}

pub(crate) type OutPointValue = [u8; 36];

impl Entry for OutPoint {
  type Value = OutPointValue;

  fn load(value: Self::Value) -> Self {
    let mut txid = [0; 32];
    txid.copy_from_slice(&value[..32]);

    let mut vout = [0; 4];
    vout.copy_from_slice(&value[32..]);

    OutPoint {
      txid: Txid::from_byte_array(txid),
      vout: u32::from_le_bytes(vout),
    }
  }

  fn store(self) -> Self::Value {
    let mut value = [0; 36];
    value[..32].copy_from_slice(self.txid.as_byte_array());
    value[32..].copy_from_slice(&self.vout.to_le_bytes());
    value
  }
}

pub(crate) type TxidValue = [u8; 32];

impl Entry for Txid {
  type Value = TxidValue;

  fn load(value: Self::Value) -> Self {
    Txid::from_byte_array(value)
  }

  fn store(self) -> Self::Value {
    Txid::to_byte_array(self)
  }
}

pub(crate) type CreditValue = (
  u64,         // value
  Vec<u8>,     // script pubkey
  Option<u32>, // height
);

impl Entry for Credit {
  type Value = (OutPointValue, CreditValue);

  fn load((outpoint, (value, script_pubkey, height)): Self::Value) -> Self {
    Self {
      outpoint: OutPoint::load(outpoint),
      tx_out: TxOut {
        value: Amount::from_sat(value),
        script_pubkey: ScriptBuf::from_bytes(script_pubkey),
      },
      height,
    }
  }

  fn store(self) -> Self::Value {
    (
      self.outpoint.store(),
      (
        self.tx_out.value.to_sat(),
        self.tx_out.script_pubkey.into_bytes(),
        self.height,
      ),
    )
  }
}
