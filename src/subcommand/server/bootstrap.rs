use {super::*, serde_json::Value, tokio::sync::oneshot};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum State {
  NoWallet,
  AwaitingSetup,
  Initialized,
}

#[derive(Debug, Deserialize)]
struct SetupParams {
  passphrase: String,
  #[serde(default)]
  mnemonic: Option<String>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct SetupOutput {
  pub(crate) address: String,
  pub(crate) mnemonic: Mnemonic,
}

/// Serves the restricted method set while no wallet exists, and hands the
/// created wallet to whoever holds the completion receiver.
pub(crate) struct Gate {
  completion: Mutex<Option<oneshot::Sender<Wallet>>>,
  settings: Settings,
  state: Mutex<State>,
}

impl Gate {
  pub(crate) fn new(settings: Settings, completion: oneshot::Sender<Wallet>) -> Self {
    Self {
      completion: Mutex::new(Some(completion)),
      settings,
      state: Mutex::new(State::NoWallet),
    }
  }

  pub(crate) fn open(&self) {
    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

    if *state == State::NoWallet {
      *state = State::AwaitingSetup;
    }
  }

  pub(crate) fn state(&self) -> State {
    *self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn setup(&self, request: &JsonRpcExtractor) -> RpcResult {
    let params = request.params::<SetupParams>(&["passphrase", "mnemonic"])?;

    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

    if *state != State::AwaitingSetup {
      return Err(unsupported(&request.method));
    }

    wallet::check_passphrase(&params.passphrase)?;

    let mnemonic = match params.mnemonic {
      Some(mnemonic) => mnemonic
        .parse::<Mnemonic>()
        .map_err(|err| RpcError::invalid_params(format!("invalid mnemonic: {err}")))?,
      None => wallet::generate_mnemonic().map_err(RpcError::internal)?,
    };

    let wallet =
      Wallet::create(&self.settings, &params.passphrase, &mnemonic).map_err(RpcError::internal)?;

    let address = wallet.addresses()[0].to_string();

    *state = State::Initialized;

    match self
      .completion
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take()
    {
      Some(completion) => {
        if completion.send(wallet).is_err() {
          log::warn!("Wallet created after setup was abandoned");
        }
      }
      None => panic!("invariant: setup completes at most once"),
    }

    log::info!("Wallet setup complete, receive address {address}");

    serde_json::to_value(SetupOutput { address, mnemonic }).map_err(RpcError::internal)
  }
}

fn unsupported(method: &str) -> RpcError {
  wallet::Error::Unsupported {
    method: method.into(),
  }
  .into()
}

impl Handler for Gate {
  fn call(&self, request: &JsonRpcExtractor) -> RpcResult {
    if self.state() != State::AwaitingSetup {
      return Err(unsupported(&request.method));
    }

    match request.method.as_str() {
      "getwalletstate" => serde_json::to_value(WalletState {
        wallet: false,
        chain_server: false,
      })
      .map_err(RpcError::internal),
      "ping" => Ok(Value::from("pong")),
      "walletsetup" => self.setup(request),
      method => Err(unsupported(method)),
    }
  }
}

/// Serves the gate until a wallet has been set up and returns it.
pub(crate) async fn wait_for_setup(settings: &Settings) -> Result<Wallet> {
  let (sender, receiver) = oneshot::channel();

  let gate = Arc::new(Gate::new(settings.clone(), sender));

  gate.open();

  let handle = Handle::new();

  let server = spawn(rpc::router(gate.clone()), settings.listen(), handle.clone());

  log::info!(
    "No wallet at `{}`, waiting for walletsetup",
    Wallet::path(settings).display()
  );

  let result = tokio::select! {
    wallet = completion(receiver, settings.setup_timeout()) => wallet,
    served = server => match served {
      Ok(Ok(())) => Err(anyhow!("server shut down before wallet setup")),
      Ok(Err(err)) => Err(err.into()),
      Err(err) => Err(err.into()),
    },
  };

  handle.graceful_shutdown(Some(Duration::from_millis(100)));

  result
}

async fn completion(
  receiver: oneshot::Receiver<Wallet>,
  timeout: Option<Duration>,
) -> Result<Wallet> {
  let wallet = match timeout {
    Some(timeout) => tokio::time::timeout(timeout, receiver)
      .await
      .map_err(|_| anyhow!("wallet setup timed out after {timeout:?}"))?,
    None => receiver.await,
  };

  wallet.context("wallet setup was abandoned")
}

#[cfg(test)]
mod tests {
  use {super::*, axum_jrpc::Id, serde_json::json};

  fn gate(tempdir: &TempDir) -> (Gate, oneshot::Receiver<Wallet>) {
    let (sender, receiver) = oneshot::channel();
    let gate = Gate::new(settings(tempdir), sender);
    gate.open();
    (gate, receiver)
  }

  fn request(method: &str, params: Value) -> JsonRpcExtractor {
    JsonRpcExtractor {
      method: method.into(),
      parsed: params,
      id: Id::Num(1),
    }
  }

  #[test]
  fn state_transitions() {
    let tempdir = TempDir::new().unwrap();

    let (sender, _receiver) = oneshot::channel();
    let gate = Gate::new(settings(&tempdir), sender);

    assert_eq!(gate.state(), State::NoWallet);
    assert_eq!(
      gate.call(&request("ping", Value::Null)).unwrap_err().code,
      error::METHOD_NOT_FOUND
    );

    gate.open();
    assert_eq!(gate.state(), State::AwaitingSetup);

    gate
      .call(&request("walletsetup", json!(["correct horse"])))
      .unwrap();
    assert_eq!(gate.state(), State::Initialized);

    gate.open();
    assert_eq!(gate.state(), State::Initialized);
  }

  #[test]
  fn restricted_methods() {
    let tempdir = TempDir::new().unwrap();
    let (gate, _receiver) = gate(&tempdir);

    assert_eq!(
      gate.call(&request("ping", Value::Null)).unwrap(),
      json!("pong")
    );

    assert_eq!(
      gate.call(&request("getwalletstate", Value::Null)).unwrap(),
      json!({ "wallet": false, "chain_server": false })
    );

    for method in ["sendbulletin", "composebulletin", "getnewaddress", "stop"] {
      assert_eq!(
        gate.call(&request(method, Value::Null)).unwrap_err(),
        unsupported(method)
      );
    }
  }

  #[test]
  fn short_passphrase_leaves_gate_waiting() {
    let tempdir = TempDir::new().unwrap();
    let (gate, mut receiver) = gate(&tempdir);

    let err = gate
      .call(&request("walletsetup", json!({ "passphrase": "12345" })))
      .unwrap_err();

    assert_eq!(err.code, error::INVALID_PARAMETER);
    assert_eq!(err.message, "passphrase must be at least 6 bytes, got 5");
    assert_eq!(gate.state(), State::AwaitingSetup);
    assert!(!Wallet::exists(&settings(&tempdir)));
    assert!(receiver.try_recv().is_err());
  }

  #[test]
  fn setup_with_mnemonic() {
    let tempdir = TempDir::new().unwrap();
    let (gate, mut receiver) = gate(&tempdir);

    let output = serde_json::from_value::<SetupOutput>(
      gate
        .call(&request(
          "walletsetup",
          json!({
            "passphrase": "correct horse",
            "mnemonic": mnemonic().to_string(),
          }),
        ))
        .unwrap(),
    )
    .unwrap();

    assert_eq!(output.mnemonic, mnemonic());

    let wallet = receiver.try_recv().unwrap();

    assert_eq!(wallet.addresses()[0].to_string(), output.address);
    assert!(Wallet::exists(&settings(&tempdir)));
  }

  #[test]
  fn setup_generates_mnemonic() {
    let tempdir = TempDir::new().unwrap();
    let (gate, mut receiver) = gate(&tempdir);

    let output = serde_json::from_value::<SetupOutput>(
      gate
        .call(&request("walletsetup", json!(["correct horse"])))
        .unwrap(),
    )
    .unwrap();

    assert_eq!(output.mnemonic.word_count(), 12);
    assert_eq!(
      receiver.try_recv().unwrap().addresses()[0].to_string(),
      output.address
    );
  }

  #[test]
  fn second_setup_is_rejected() {
    let tempdir = TempDir::new().unwrap();
    let (gate, _receiver) = gate(&tempdir);

    gate
      .call(&request("walletsetup", json!(["correct horse"])))
      .unwrap();

    assert_eq!(
      gate
        .call(&request("walletsetup", json!(["correct horse"])))
        .unwrap_err(),
      unsupported("walletsetup")
    );

    assert_eq!(
      gate.call(&request("ping", Value::Null)).unwrap_err(),
      unsupported("ping")
    );
  }

  #[test]
  fn invalid_mnemonic() {
    let tempdir = TempDir::new().unwrap();
    let (gate, _receiver) = gate(&tempdir);

    assert_eq!(
      gate
        .call(&request(
          "walletsetup",
          json!({ "passphrase": "correct horse", "mnemonic": "foo bar" }),
        ))
        .unwrap_err()
        .code,
      error::INVALID_PARAMETER
    );

    assert_eq!(gate.state(), State::AwaitingSetup);
  }

  #[test]
  fn setup_timeout() {
    let (_sender, receiver) = oneshot::channel::<Wallet>();

    assert_eq!(
      Runtime::new()
        .unwrap()
        .block_on(completion(receiver, Some(Duration::from_millis(10))))
        .err()
        .unwrap()
        .to_string(),
      "wallet setup timed out after 10ms"
    );
  }

  #[test]
  fn abandoned_setup() {
    let (sender, receiver) = oneshot::channel::<Wallet>();

    drop(sender);

    assert_eq!(
      Runtime::new()
        .unwrap()
        .block_on(completion(receiver, None))
        .err()
        .unwrap()
        .to_string(),
      "wallet setup was abandoned"
    );
  }

  #[test]
  fn serves_until_setup() {
    let tempdir = TempDir::new().unwrap();

    let port = free_port();

    let mut settings = settings(&tempdir);
    settings.listen = Some(SocketAddr::from(([127, 0, 0, 1], port)));
    settings.setup_timeout = Some(60);

    let runtime = Runtime::new().unwrap();

    let setup = runtime.spawn(async move { wait_for_setup(&settings).await });

    let response = post(
      port,
      &json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "walletsetup",
        "params": ["correct horse"],
      }),
    );

    let wallet = runtime.block_on(setup).unwrap().unwrap();

    assert_eq!(
      response["result"]["address"],
      wallet.addresses()[0].to_string()
    );
  }
}
