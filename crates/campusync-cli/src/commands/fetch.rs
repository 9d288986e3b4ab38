use std::sync::Arc;

use campusync_core::fetch::OfflineNetwork;
use campusync_core::{Config, FetchInterceptor, OfflineRuntime, Request};
use clap::Args;
use url::Url;

use super::{open_store, CliResult};

#[derive(Args)]
pub struct FetchArgs {
    /// Absolute URL, or a path resolved against `network.origin`
    url: String,
    /// Treat the request as a page navigation
    #[arg(long)]
    navigate: bool,
    /// Answer from the stored caches only, as if the network were down
    #[arg(long)]
    offline: bool,
    /// Print response headers
    #[arg(long)]
    headers: bool,
}

pub async fn run(args: FetchArgs) -> CliResult {
    let config = Config::load_or_default();
    let target = resolve(&config.network.origin, &args.url)?;
    let runtime = OfflineRuntime::builder(config.clone())
        .store(open_store()?)
        .build()?;

    if !args.offline {
        match runtime.install().await {
            Ok(count) => tracing::info!(count, "app shell installed"),
            Err(e) => eprintln!("warning: app shell not installed: {e}"),
        }
    }

    let request = if args.navigate {
        Request::navigate(target)
    } else {
        Request::get(target)
    };

    let response = if args.offline {
        let offline = FetchInterceptor::new(
            &config,
            runtime.interceptor().cache().clone(),
            Arc::new(OfflineNetwork),
        )?;
        offline.handle(&request).await
    } else {
        runtime.fetch(&request).await
    };

    println!("{} ({})", response.status, response.source);
    if args.headers {
        for (name, value) in &response.headers {
            println!("{name}: {value}");
        }
    }
    println!();
    println!("{}", response.text_body());
    Ok(())
}

fn resolve(origin: &str, target: &str) -> Result<Url, Box<dyn std::error::Error>> {
    match Url::parse(target) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(Url::parse(origin)?.join(target)?),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_join_origin() {
        let url = resolve("http://localhost:3000", "/api/projects").unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/projects");
        let abs = resolve("http://localhost:3000", "https://cdn.example/x.js").unwrap();
        assert_eq!(abs.host_str(), Some("cdn.example"));
    }
}
