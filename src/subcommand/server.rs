use {
  self::{
    error::{RpcError, RpcResult},
    rpc::{Handler, Params},
    service::Service,
  },
  super::*,
  axum::Router,
  axum_jrpc::JsonRpcExtractor,
  axum_server::Handle,
};

mod bootstrap;
mod error;
mod rpc;
mod service;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub(crate) struct WalletState {
  pub(crate) wallet: bool,
  pub(crate) chain_server: bool,
}

#[derive(Debug, Parser)]
pub(crate) struct Server {
  #[arg(long, help = "Don't scan the chain server for wallet outputs at startup.")]
  no_sync: bool,
}

impl Server {
  pub(crate) fn run(self, settings: Settings) -> SubcommandResult {
    Runtime::new()?.block_on(self.serve(settings))
  }

  async fn serve(self, settings: Settings) -> SubcommandResult {
    let wallet = if Wallet::exists(&settings) {
      Wallet::open(&settings)?
    } else {
      bootstrap::wait_for_setup(&settings).await?
    };

    let wallet = Arc::new(wallet);

    let chain: Arc<dyn ChainClient> = {
      let settings = settings.clone();
      Arc::new(task::spawn_blocking(move || settings.bitcoin_rpc_client()).await??)
    };

    if !self.no_sync {
      let (wallet, chain) = (wallet.clone(), chain.clone());
      if let Err(err) = task::spawn_blocking(move || wallet.sync(&*chain)).await? {
        log::warn!("Failed to sync wallet with chain server: {err}");
      }
    }

    let flusher = spawn_flusher(wallet.clone(), settings.flush_interval());

    let served = spawn(
      rpc::router(Arc::new(Service::new(wallet.clone(), chain))),
      settings.listen(),
      Handle::new(),
    )
    .await?;

    flusher.abort();

    if task::spawn_blocking(move || wallet.flush()).await?? {
      log::info!("Flushed wallet database on shutdown");
    }

    served?;

    Ok(None)
  }
}

/// Serves `router` on `addr` until `handle` is shut down.
fn spawn(router: Router, addr: SocketAddr, handle: Handle) -> task::JoinHandle<io::Result<()>> {
  LISTENERS
    .lock()
    .unwrap_or_else(PoisonError::into_inner)
    .push(handle.clone());

  log::info!("Listening on http://{addr}");

  tokio::spawn(async move {
    axum_server::bind(addr)
      .handle(handle)
      .serve(router.into_make_service())
      .await
  })
}

/// Periodically makes recorded transactions durable.
fn spawn_flusher(wallet: Arc<Wallet>, interval: Duration) -> task::JoinHandle<()> {
  tokio::spawn(async move {
    let mut interval = tokio::time::interval(interval);

    loop {
      interval.tick().await;

      let wallet = wallet.clone();

      match task::spawn_blocking(move || wallet.flush()).await {
        Ok(Ok(true)) => log::debug!("Flushed wallet database"),
        Ok(Ok(false)) => {}
        Ok(Err(err)) => log::error!("Failed to flush wallet database: {err}"),
        Err(err) => log::error!("Flush task failed: {err}"),
      }
    }
  })
}
