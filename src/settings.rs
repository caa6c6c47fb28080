use {super::*, bitcoincore_rpc::Auth};

/// Resolved configuration. Each field is taken from the first of: command
/// line flag, `BULLETIN_WALLET_*` environment variable, configuration file,
/// default.
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
  pub(crate) allow_free: bool,
  pub(crate) bitcoin_data_dir: Option<PathBuf>,
  pub(crate) bitcoin_rpc_password: Option<String>,
  pub(crate) bitcoin_rpc_url: Option<String>,
  pub(crate) bitcoin_rpc_username: Option<String>,
  pub(crate) chain: Option<Chain>,
  pub(crate) cookie_file: Option<PathBuf>,
  pub(crate) data_dir: Option<PathBuf>,
  pub(crate) fee_rate: Option<FeeRate>,
  pub(crate) flush_interval: Option<u64>,
  pub(crate) listen: Option<SocketAddr>,
  pub(crate) setup_timeout: Option<u64>,
  pub(crate) wallet_passphrase: Option<String>,
}

impl Settings {
  pub(crate) fn merge(options: Options, env: BTreeMap<String, String>) -> Result<Self> {
    let settings = Settings::from_options(options.clone()).or(Settings::from_env(env)?);

    let config_path = match &options.config {
      Some(path) => Some(path.clone()),
      None => match &options.config_dir {
        Some(dir) if dir.join("bulletin-wallet.yaml").exists() => {
          Some(dir.join("bulletin-wallet.yaml"))
        }
        Some(_) | None => None,
      },
    };

    let config = match config_path {
      Some(config_path) => {
        let file = File::open(&config_path).snafu_context(error::Io {
          path: config_path.clone(),
        })?;

        serde_yaml::from_reader(file).with_context(|| {
          format!(
            "failed to deserialize config file `{}`",
            config_path.display()
          )
        })?
      }
      None => Settings::default(),
    };

    settings.or(config).or_defaults()
  }

  pub(crate) fn from_options(options: Options) -> Self {
    Self {
      allow_free: options.allow_free,
      bitcoin_data_dir: options.bitcoin_data_dir,
      bitcoin_rpc_password: options.bitcoin_rpc_password,
      bitcoin_rpc_url: options.bitcoin_rpc_url,
      bitcoin_rpc_username: options.bitcoin_rpc_username,
      chain: options
        .signet
        .then_some(Chain::Signet)
        .or(options.regtest.then_some(Chain::Regtest))
        .or(options.testnet.then_some(Chain::Testnet))
        .or(options.chain_argument),
      cookie_file: options.cookie_file,
      data_dir: options.data_dir,
      fee_rate: options.fee_rate,
      flush_interval: options.flush_interval,
      listen: options.listen,
      setup_timeout: options.setup_timeout,
      wallet_passphrase: options.wallet_passphrase,
    }
  }

  pub(crate) fn from_env(env: BTreeMap<String, String>) -> Result<Self> {
    let get_bool = |key| env.get(key).map(|value| !value.is_empty()).unwrap_or_default();

    let get_string = |key| env.get(key).cloned();

    let get_path = |key| env.get(key).map(PathBuf::from);

    fn get_typed<T: FromStr<Err = Error>>(
      env: &BTreeMap<String, String>,
      key: &str,
    ) -> Result<Option<T>> {
      env
        .get(key)
        .map(|value| {
          value
            .parse()
            .with_context(|| format!("failed to parse environment variable BULLETIN_WALLET_{key}"))
        })
        .transpose()
    }

    fn get_u64(env: &BTreeMap<String, String>, key: &str) -> Result<Option<u64>> {
      env
        .get(key)
        .map(|value| {
          value
            .parse()
            .with_context(|| {
              format!("failed to parse environment variable BULLETIN_WALLET_{key} as u64")
            })
        })
        .transpose()
    }

    Ok(Self {
      allow_free: get_bool("ALLOW_FREE"),
      bitcoin_data_dir: get_path("BITCOIN_DATA_DIR"),
      bitcoin_rpc_password: get_string("BITCOIN_RPC_PASSWORD"),
      bitcoin_rpc_url: get_string("BITCOIN_RPC_URL"),
      bitcoin_rpc_username: get_string("BITCOIN_RPC_USERNAME"),
      chain: get_typed(&env, "CHAIN")?,
      cookie_file: get_path("COOKIE_FILE"),
      data_dir: get_path("DATA_DIR"),
      fee_rate: get_typed(&env, "FEE_RATE")?,
      flush_interval: get_u64(&env, "FLUSH_INTERVAL")?,
      listen: env
        .get("LISTEN")
        .map(|value| {
          value
            .parse()
            .context("failed to parse environment variable BULLETIN_WALLET_LISTEN")
        })
        .transpose()?,
      setup_timeout: get_u64(&env, "SETUP_TIMEOUT")?,
      wallet_passphrase: get_string("WALLET_PASSPHRASE"),
    })
  }

  pub(crate) fn or(self, source: Settings) -> Self {
    Self {
      allow_free: self.allow_free || source.allow_free,
      bitcoin_data_dir: self.bitcoin_data_dir.or(source.bitcoin_data_dir),
      bitcoin_rpc_password: self.bitcoin_rpc_password.or(source.bitcoin_rpc_password),
      bitcoin_rpc_url: self.bitcoin_rpc_url.or(source.bitcoin_rpc_url),
      bitcoin_rpc_username: self.bitcoin_rpc_username.or(source.bitcoin_rpc_username),
      chain: self.chain.or(source.chain),
      cookie_file: self.cookie_file.or(source.cookie_file),
      data_dir: self.data_dir.or(source.data_dir),
      fee_rate: self.fee_rate.or(source.fee_rate),
      flush_interval: self.flush_interval.or(source.flush_interval),
      listen: self.listen.or(source.listen),
      setup_timeout: self.setup_timeout.or(source.setup_timeout),
      wallet_passphrase: self.wallet_passphrase.or(source.wallet_passphrase),
    }
  }

  pub(crate) fn or_defaults(self) -> Result<Self> {
    let chain = self.chain.unwrap_or_default();

    let data_dir = match self.data_dir {
      Some(data_dir) => data_dir,
      None => dirs::data_dir()
        .context("could not get data dir")?
        .join("bulletin-wallet"),
    };

    let cookie_file = match self.cookie_file {
      Some(cookie_file) => cookie_file,
      None => {
        let bitcoin_data_dir = match &self.bitcoin_data_dir {
          Some(bitcoin_data_dir) => bitcoin_data_dir.clone(),
          None => {
            if cfg!(target_os = "linux") {
              dirs::home_dir()
                .ok_or_else(|| anyhow!("failed to get cookie file path: could not get home dir"))?
                .join(".bitcoin")
            } else {
              dirs::data_dir()
                .ok_or_else(|| anyhow!("failed to get cookie file path: could not get data dir"))?
                .join("Bitcoin")
            }
          }
        };

        chain.join_with_data_dir(bitcoin_data_dir).join(".cookie")
      }
    };

    Ok(Self {
      allow_free: self.allow_free,
      bitcoin_data_dir: self.bitcoin_data_dir,
      bitcoin_rpc_password: self.bitcoin_rpc_password,
      bitcoin_rpc_url: Some(
        self
          .bitcoin_rpc_url
          .clone()
          .unwrap_or_else(|| format!("127.0.0.1:{}", chain.default_rpc_port())),
      ),
      bitcoin_rpc_username: self.bitcoin_rpc_username,
      chain: Some(chain),
      cookie_file: Some(cookie_file),
      data_dir: Some(data_dir),
      fee_rate: Some(self.fee_rate.unwrap_or_default()),
      flush_interval: Some(self.flush_interval.unwrap_or(5)),
      listen: Some(self.listen.unwrap_or_else(|| {
        SocketAddr::from(([127, 0, 0, 1], chain.default_listen_port()))
      })),
      setup_timeout: self.setup_timeout,
      wallet_passphrase: self.wallet_passphrase,
    })
  }

  pub(crate) fn auth(&self) -> Result<Auth> {
    match (&self.bitcoin_rpc_username, &self.bitcoin_rpc_password) {
      (Some(rpc_user), Some(rpc_pass)) => Ok(Auth::UserPass(rpc_user.clone(), rpc_pass.clone())),
      (None, Some(_rpc_pass)) => Err(anyhow!("no bitcoin RPC username specified")),
      (Some(_rpc_user), None) => Err(anyhow!("no bitcoin RPC password specified")),
      _ => Ok(Auth::CookieFile(self.cookie_file()?)),
    }
  }

  pub(crate) fn bitcoin_rpc_client(&self) -> Result<Client> {
    let rpc_url = self.bitcoin_rpc_url();

    let auth = self.auth()?;

    log::info!("Connecting to Bitcoin Core at {rpc_url}");

    if let Auth::CookieFile(cookie_file) = &auth {
      log::info!(
        "Using credentials from cookie file at `{}`",
        cookie_file.display()
      );

      ensure!(
        cookie_file.is_file(),
        "cookie file `{}` does not exist",
        cookie_file.display()
      );
    }

    let client = Client::new(&rpc_url, auth)
      .with_context(|| format!("failed to connect to Bitcoin Core RPC at `{rpc_url}`"))?;

    let mut checks = 0;
    let rpc_chain = loop {
      match client.get_blockchain_info() {
        Ok(blockchain_info) => {
          break match blockchain_info.chain {
            Network::Bitcoin => Chain::Mainnet,
            Network::Testnet => Chain::Testnet,
            Network::Regtest => Chain::Regtest,
            Network::Signet => Chain::Signet,
            other => bail!("Bitcoin RPC server on unknown chain: {other}"),
          }
        }
        Err(bitcoincore_rpc::Error::JsonRpc(bitcoincore_rpc::jsonrpc::Error::Rpc(err)))
          if err.code == -28 => {}
        Err(err) => bail!("Failed to connect to Bitcoin Core RPC at `{rpc_url}`:  {err}"),
      }

      ensure! {
        checks < 100,
        "Failed to connect to Bitcoin Core RPC at `{rpc_url}`",
      }

      checks += 1;
      thread::sleep(Duration::from_millis(100));
    };

    let chain = self.chain();

    if rpc_chain != chain {
      bail!("Bitcoin RPC server is on {rpc_chain} but wallet is on {chain}");
    }

    Ok(client)
  }

  pub fn allow_free(&self) -> bool {
    self.allow_free
  }

  pub fn bitcoin_rpc_url(&self) -> String {
    self
      .bitcoin_rpc_url
      .clone()
      .unwrap_or_else(|| format!("127.0.0.1:{}", self.chain().default_rpc_port()))
  }

  pub fn chain(&self) -> Chain {
    self.chain.unwrap_or_default()
  }

  pub(crate) fn cookie_file(&self) -> Result<PathBuf> {
    self
      .cookie_file
      .clone()
      .ok_or_else(|| anyhow!("no cookie file configured"))
  }

  pub fn data_dir(&self) -> PathBuf {
    self
      .chain()
      .join_with_data_dir(self.data_dir.clone().unwrap_or_default())
  }

  pub fn fee_rate(&self) -> FeeRate {
    self.fee_rate.unwrap_or_default()
  }

  pub fn flush_interval(&self) -> Duration {
    Duration::from_secs(self.flush_interval.unwrap_or(5).max(1))
  }

  pub fn listen(&self) -> SocketAddr {
    self
      .listen
      .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], self.chain().default_listen_port())))
  }

  pub fn setup_timeout(&self) -> Option<Duration> {
    self.setup_timeout.map(Duration::from_secs)
  }

  pub fn wallet_passphrase(&self) -> Option<&str> {
    self.wallet_passphrase.as_deref()
  }
}
