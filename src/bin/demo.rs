use std::sync::Arc;

use transporter::config::{ClientOptions, DemoConfig, ServerOptions};
use transporter::transport::duplex_pair;
use transporter::value::Value;
use transporter::{create_module, use_module};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DemoConfig::load()?;
    simple_logger::init_with_level(config.log.level.as_level())?;

    let (server_side, client_side) = duplex_pair();

    let export = Value::object([
        ("version".to_string(), Value::from("1.0")),
        (
            "echo".to_string(),
            Value::function(|args| {
                Box::pin(async move { Ok(args.into_iter().next().unwrap_or(Value::Null)) })
            }),
        ),
    ]);

    let server = create_module(
        export,
        Arc::new(server_side),
        ServerOptions::new(config.namespace.clone()),
    )?;

    let client = use_module(
        Arc::new(client_side),
        ClientOptions::new(config.namespace.clone(), config.timeout()),
    );

    let root = client.root();
    let version = root.field("version").get().await?;
    log::info!("server reports version {version:?}");

    let echoed = root.field("echo").apply(vec![Value::from("hello")]).await?;
    log::info!("echo replied {echoed:?}");

    client.release();
    server.release();
    Ok(())
}
