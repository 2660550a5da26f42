use cashflow_nlq::ax_state::AppState;
use cashflow_nlq::config::AppConfig;
use cashflow_nlq::core::generator::SqlGenerator;
use cashflow_nlq::core::pipeline::NlqService;
use cashflow_nlq::core::validator::SqlValidator;
use cashflow_nlq::infra::db_internal::init_db;
use cashflow_nlq::infra::executor::PgExecutor;
use cashflow_nlq::infra::llm::build_generator;
use cashflow_nlq::infra::query_log::PgQueryLog;
use cashflow_nlq::models::schema::{load_whitelists, FunctionWhitelist, SchemaWhitelist};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let config = AppConfig::from_env()?;
    info!("配置加载完成: {:?}", config.llm);

    let (schema, functions) = match &config.schema_path {
        Some(path) => {
            info!("从 {} 加载白名单", path.display());
            load_whitelists(path)?
        }
        None => (SchemaWhitelist::cashflow(), FunctionWhitelist::standard()),
    };
    let validator = SqlValidator::new(Arc::new(schema), Arc::new(functions));

    let db = init_db(&config).await?;
    let provider = build_generator(&config.llm)?;
    if provider.is_none() {
        info!("未配置 LLM，仅使用模板生成 SQL");
    }

    let generator = SqlGenerator::new(validator, provider, Duration::from_secs(config.llm.timeout_secs));
    let nlq = NlqService::new(
        generator,
        Arc::new(PgExecutor::new(db.clone(), config.statement_timeout_ms)),
        Arc::new(PgQueryLog::new(db)),
    );
    let state = Arc::new(AppState { nlq });

    let app = cashflow_nlq::app(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("🚀 cashflow-nlq 运行在 http://{}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
