use {super::*, serde_json::Value, wallet::BuiltTransaction};

const BULLETIN_PARAMS: &[&str] = &["address", "board", "message"];

/// Full-service method table, available once a wallet is open.
pub(crate) struct Service {
  chain: Arc<dyn ChainClient>,
  wallet: Arc<Wallet>,
}

impl Service {
  pub(crate) fn new(wallet: Arc<Wallet>, chain: Arc<dyn ChainClient>) -> Self {
    Self { chain, wallet }
  }

  fn build(&self, request: &JsonRpcExtractor) -> RpcResult<BuiltTransaction> {
    let bulletin = request.params::<BulletinRequest>(BULLETIN_PARAMS)?;

    Ok(
      self
        .wallet
        .build_bulletin_transaction(&*self.chain, &bulletin)?,
    )
  }

  fn compose_bulletin(&self, request: &JsonRpcExtractor) -> RpcResult {
    Ok(Value::from(self.build(request)?.raw_hex()))
  }

  fn send_bulletin(&self, request: &JsonRpcExtractor) -> RpcResult {
    let built = self.build(request)?;
    self.broadcast(built)
  }

  /// Broadcasts and then records `built`. Its inputs stay reserved until the
  /// transaction is recorded.
  fn broadcast(&self, built: BuiltTransaction) -> RpcResult {
    let txid = self
      .chain
      .send_raw_transaction(&built.transaction)
      .map_err(RpcError::broadcast_rejected)?;

    if let Err(err) = self.wallet.insert_transaction(&built) {
      log::error!("Transaction {txid} was broadcast but could not be recorded: {err}");
      return Err(RpcError::broadcast_unrecorded(txid, err));
    }

    log::info!(
      "Broadcast bulletin {txid} spending {} inputs and paying {} sat fee",
      built.reserved().len(),
      built.fee.to_sat()
    );

    Ok(Value::from(txid.to_string()))
  }

  fn wallet_state(&self) -> RpcResult {
    serde_json::to_value(WalletState {
      wallet: true,
      chain_server: self.chain.is_connected(),
    })
    .map_err(RpcError::internal)
  }
}

impl Handler for Service {
  fn call(&self, request: &JsonRpcExtractor) -> RpcResult {
    match request.method.as_str() {
      "composebulletin" => self.compose_bulletin(request),
      "getnewaddress" => Ok(Value::from(
        self
          .wallet
          .new_address()
          .map_err(RpcError::internal)?
          .to_string(),
      )),
      "getwalletstate" => self.wallet_state(),
      "ping" => Ok(Value::from("pong")),
      "sendbulletin" => self.send_bulletin(request),
      method => Err(
        wallet::Error::Unsupported {
          method: method.into(),
        }
        .into(),
      ),
    }
  }
}
