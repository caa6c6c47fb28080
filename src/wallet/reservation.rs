use super::*;

/// Outpoints excluded from selection while a built transaction is in flight.
/// Dropping the reservation returns them to the pool.
#[derive(Debug)]
pub struct Reservation {
  outpoints: Vec<OutPoint>,
  reserved: Arc<Mutex<BTreeSet<OutPoint>>>,
}

impl Reservation {
  pub(crate) fn new(reserved: Arc<Mutex<BTreeSet<OutPoint>>>, outpoints: Vec<OutPoint>) -> Self {
    {
      let mut set = reserved.lock().unwrap_or_else(PoisonError::into_inner);
      for outpoint in &outpoints {
        assert!(set.insert(*outpoint), "invariant: outpoint {outpoint} reserved twice");
      }
    }

    Self {
      outpoints,
      reserved,
    }
  }

  pub fn outpoints(&self) -> &[OutPoint] {
    &self.outpoints
  }
}

impl Drop for Reservation {
  fn drop(&mut self) {
    let mut set = self.reserved.lock().unwrap_or_else(PoisonError::into_inner);
    for outpoint in &self.outpoints {
      set.remove(outpoint);
    }
  }
}
