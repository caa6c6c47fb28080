use super::*;

impl Wallet {
  /// Credits with at least `minconf` confirmations at `tip` that are not
  /// reserved by an in-flight build.
  pub(crate) fn eligible_credits(
    &self,
    _unlock: &HeldUnlock,
    minconf: u32,
    tip: BlockStamp,
  ) -> Result<Vec<Credit>, Error> {
    let reserved = self
      .reserved
      .lock()
      .unwrap_or_else(PoisonError::into_inner);

    Ok(
      self
        .database
        .credits()
        .map_err(Error::store)?
        .into_iter()
        .filter(|credit| credit.confirmations(tip.height) >= minconf)
        .filter(|credit| !reserved.contains(&credit.outpoint))
        .collect(),
    )
  }
}

/// Position of the last pay-to-pubkey-hash credit paying `target`.
pub(crate) fn find_author_credit(
  credits: &[Credit],
  target: &Address,
  network: Network,
) -> Result<usize, Error> {
  credits
    .iter()
    .rposition(|credit| {
      credit.script_class() == ScriptClass::PubkeyHash
        && credit.address(network).as_ref() == Some(target)
    })
    .ok_or_else(|| Error::NoEligibleOutputForAddress {
      address: target.clone(),
    })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn author_credit_is_last_match() {
    let credits = [
      credit(1, 600, 2, Some(1)),
      credit(2, 600, 1, Some(1)),
      credit(3, 900, 1, Some(1)),
      credit(4, 900, 3, Some(1)),
    ];

    assert_eq!(
      find_author_credit(&credits, &address(1), Network::Regtest),
      Ok(2)
    );
  }

  #[test]
  fn author_credit_must_be_p2pkh() {
    let mut credit = credit(1, 600, 1, Some(1));
    credit.tx_out.script_pubkey = ScriptBuf::new_p2sh(&bitcoin::ScriptHash::all_zeros());

    assert_eq!(
      find_author_credit(&[credit], &address(1), Network::Regtest),
      Err(Error::NoEligibleOutputForAddress {
        address: address(1)
      })
    );
  }

  #[test]
  fn no_credits() {
    assert_eq!(
      find_author_credit(&[], &address(1), Network::Regtest),
      Err(Error::NoEligibleOutputForAddress {
        address: address(1)
      })
    );
  }
}
