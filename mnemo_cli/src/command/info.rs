use mnemo_config::Config;
use tracing::info;

/// Strategy for displaying configuration information.
///
/// Outputs the resolved server/store/embedder/defaults configuration, the
/// store's connectivity, and which provider credentials are resolvable from
/// the environment.
#[derive(Debug, Clone, Copy)]
pub struct InfoStrategy;

impl super::CommandStrategy for InfoStrategy {
    type Input = ();

    async fn execute(&self, _input: Self::Input) -> anyhow::Result<()> {
        let config = Config::load()?;

        println!("=== mnemo configuration ===\n");

        println!("Server:");
        println!("  Bind address: {}", config.server.bind_addr);
        println!("  MCP path: {}", config.server.mcp_path);
        println!();

        println!("Store:");
        println!("  URL: {}", mask_database_url(&config.store.url));
        println!("  Padded embedding width (D_pad): {}", config.store.d_pad);

        info!("Testing store connection");
        match sea_orm::Database::connect(&config.store.url).await {
            Ok(_) => println!("  Status: Connected"),
            Err(e) => {
                println!("  Status: Connection failed");
                println!("  Error: {e}");
            }
        }
        println!();

        println!("Embedder:");
        println!("  Provider: {}", config.embedder.provider);
        println!("  Model: {}", config.embedder.model);
        println!();

        println!("Defaults:");
        println!("  Chat model: {}", config.defaults.chat_model);
        println!("  Persona: {}", truncate(&config.defaults.persona, 60));
        println!("  Timezone: {}", config.defaults.timezone);
        println!();

        println!("Provider credentials:");
        for provider in ["openai", "anthropic", "google", "deepseek"] {
            let status = if mnemo_providers::resolve_credential(provider).is_ok() {
                "configured"
            } else {
                "missing"
            };
            println!("  {provider}: {status}");
        }

        Ok(())
    }
}

fn mask_database_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };

    let Some((credentials, after_at)) = rest.split_once('@') else {
        return url.to_string();
    };

    let Some((username, _password)) = credentials.split_once(':') else {
        return url.to_string();
    };

    format!("{scheme}://{username}:***{after_at}")
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len - 3])
    }
}
