use {
  super::*,
  bitcoin::{
    ecdsa,
    script::PushBytesBuf,
    sighash::{EcdsaSighashType, SighashCache},
  },
  secp256k1::{Message, SECP256K1},
};

/// Private keys for the scripts a wallet can spend.
pub trait KeySource {
  fn private_key(&self, script_pubkey: &Script) -> Option<PrivateKey>;
}

/// Signs every input of `transaction` with SIGHASH_ALL. `prevouts[i]` is the
/// output spent by input `i`.
pub(crate) fn sign_transaction(
  transaction: &mut Transaction,
  prevouts: &[TxOut],
  keys: &impl KeySource,
) -> Result<(), Error> {
  assert_eq!(
    transaction.input.len(),
    prevouts.len(),
    "invariant: every input has a prevout"
  );

  for (input, prevout) in prevouts.iter().enumerate() {
    let private_key =
      keys
        .private_key(&prevout.script_pubkey)
        .ok_or_else(|| Error::SigningFailed {
          input,
          reason: "no key for output script".into(),
        })?;

    let message = legacy_message(transaction, input, &prevout.script_pubkey)
      .map_err(|err| Error::SigningFailed {
        input,
        reason: err.to_string(),
      })?;

    let signature =
      ecdsa::Signature::sighash_all(SECP256K1.sign_ecdsa(&message, &private_key.inner));

    let signature =
      PushBytesBuf::try_from(signature.to_vec()).map_err(|err| Error::SigningFailed {
        input,
        reason: err.to_string(),
      })?;

    transaction.input[input].script_sig = script::Builder::new()
      .push_slice(signature)
      .push_key(&private_key.public_key(SECP256K1))
      .into_script();
  }

  Ok(())
}

/// Runs every input script against the output it spends through the
/// consensus script interpreter.
pub(crate) fn validate_transaction(
  transaction: &Transaction,
  prevouts: &[TxOut],
) -> Result<(), Error> {
  if transaction.input.len() != prevouts.len() {
    return Err(Error::ScriptValidationFailed {
      input: transaction.input.len().min(prevouts.len()),
    });
  }

  let serialized = consensus::serialize(transaction);

  for (input, prevout) in prevouts.iter().enumerate() {
    if !prevout.script_pubkey.is_p2pkh() {
      log::debug!("input {input} spends a non pay-to-pubkey-hash output");
      return Err(Error::ScriptValidationFailed { input });
    }

    if let Err(err) = prevout
      .script_pubkey
      .verify(input, prevout.value, &serialized)
    {
      log::debug!("input {input} failed validation: {err}");
      return Err(Error::ScriptValidationFailed { input });
    }
  }

  Ok(())
}

fn legacy_message(
  transaction: &Transaction,
  input: usize,
  script_pubkey: &Script,
) -> Result<Message> {
  let sighash = SighashCache::new(transaction).legacy_signature_hash(
    input,
    script_pubkey,
    EcdsaSighashType::All.to_u32(),
  )?;

  Ok(Message::from_digest(sighash.to_byte_array()))
}
