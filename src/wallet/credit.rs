use super::*;

/// An unspent output the wallet can spend, with the height of the block that
/// confirmed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credit {
  pub outpoint: OutPoint,
  pub tx_out: TxOut,
  pub height: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScriptClass {
  PubkeyHash,
  ScriptHash,
  WitnessPubkeyHash,
  WitnessScriptHash,
  Taproot,
  NullData,
  NonStandard,
}

impl From<&Script> for ScriptClass {
  fn from(script: &Script) -> Self {
    if script.is_p2pkh() {
      Self::PubkeyHash
    } else if script.is_p2sh() {
      Self::ScriptHash
    } else if script.is_p2wpkh() {
      Self::WitnessPubkeyHash
    } else if script.is_p2wsh() {
      Self::WitnessScriptHash
    } else if script.is_p2tr() {
      Self::Taproot
    } else if script.is_op_return() {
      Self::NullData
    } else {
      Self::NonStandard
    }
  }
}

impl Credit {
  pub fn amount(&self) -> Amount {
    self.tx_out.value
  }

  /// Confirmations at chain height `tip`, zero while unconfirmed.
  pub fn confirmations(&self, tip: u32) -> u32 {
    match self.height {
      Some(height) if height <= tip => tip - height + 1,
      _ => 0,
    }
  }

  pub fn script_class(&self) -> ScriptClass {
    self.tx_out.script_pubkey.as_script().into()
  }

  pub fn address(&self, network: Network) -> Option<Address> {
    Address::from_script(&self.tx_out.script_pubkey, network).ok()
  }
}
