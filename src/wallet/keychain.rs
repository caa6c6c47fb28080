use {
  super::*,
  bitcoin::{
    bip32::{ChildNumber, DerivationPath, Xpriv},
    secp256k1::{All, Secp256k1},
  },
};

/// Deterministic P2PKH keys under `m/44'/coin'/0'/0/i`.
pub(crate) struct Keychain {
  addresses: Vec<Address>,
  keys: BTreeMap<ScriptBuf, PrivateKey>,
  master: Xpriv,
  network: Network,
  path: DerivationPath,
  secp: Secp256k1<All>,
}

impl Keychain {
  pub(crate) fn new(seed: &[u8], chain: Chain) -> Result<Self> {
    let secp = Secp256k1::new();

    let master = Xpriv::new_master(chain.network(), seed)?;

    let path = DerivationPath::master()
      .child(ChildNumber::Hardened { index: 44 })
      .child(ChildNumber::Hardened {
        index: chain.coin_type(),
      })
      .child(ChildNumber::Hardened { index: 0 })
      .child(ChildNumber::Normal { index: 0 });

    Ok(Self {
      addresses: Vec::new(),
      keys: BTreeMap::new(),
      master,
      network: chain.network(),
      path,
      secp,
    })
  }

  /// Derives the next address in sequence.
  pub(crate) fn derive_next(&mut self) -> Result<Address> {
    let index = u32::try_from(self.addresses.len()).context("address index overflow")?;

    let private_key = self
      .master
      .derive_priv(&self.secp, &self.path.child(ChildNumber::Normal { index }))?
      .to_priv();

    let address = Address::p2pkh(private_key.public_key(&self.secp), self.network);

    self.keys.insert(address.script_pubkey(), private_key);
    self.addresses.push(address.clone());

    Ok(address)
  }

  pub(crate) fn addresses(&self) -> &[Address] {
    &self.addresses
  }

  pub(crate) fn contains(&self, script_pubkey: &Script) -> bool {
    self.keys.contains_key(script_pubkey)
  }
}

impl KeySource for Keychain {
  fn private_key(&self, script_pubkey: &Script) -> Option<PrivateKey> {
    self.keys.get(script_pubkey).copied()
  }
}
