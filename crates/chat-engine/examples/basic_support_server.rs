//! Minimal end-to-end demo: one agent, one customer, one escalation.
//!
//! Run with `cargo run --example basic_support_server`.

use chatline_engine::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chatline_engine=debug".into()),
        )
        .init();

    let server = SupportServer::builder(EngineConfig::default()).build();
    server.start();
    let engine = server.engine();

    // Watch the global feed and print everything the engine announces.
    let mut admin_feed = engine.subscribe(&Topic::AdminGlobal);
    let printer = tokio::spawn(async move {
        while let Ok(event) = admin_feed.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                println!("event: {json}");
            }
        }
    });

    let alice = AgentId::from("alice");
    engine
        .register_agent(alice.clone(), "Alice", vec!["billing".into()])
        .await?;
    engine.agent_online(&alice).await?;

    let session_id = engine.create_session().await?;

    // Answered by the automated responder.
    if let Some(reply) = engine
        .handle_customer_message(&session_id, "I have a question about my invoice")
        .await?
    {
        println!("responder: {}", reply.content);
    }

    // Keyword trigger: escalates and assigns to Alice.
    if let Some(notice) = engine
        .handle_customer_message(&session_id, "Actually I want a refund")
        .await?
    {
        println!("responder: {}", notice.content);
    }

    let session = engine.session_snapshot(&session_id).await?;
    println!(
        "session {} is {:?}, assigned to {:?}",
        session.id, session.status, session.assigned_agent
    );

    engine
        .agent_send_message(&alice, &session_id, "Hi, Alice here. Let me sort out that refund.")
        .await?;
    engine.resolve_session(&session_id, Some(5)).await?;
    engine.submit_feedback(&session_id, 5, Some("quick and helpful".into())).await?;

    let analytics = engine.agent_analytics(&alice).await?;
    println!(
        "agent {}: rating {:.1} over {} rating(s)",
        analytics.agent_id, analytics.avg_rating, analytics.total_feedback
    );

    server.stop().await?;
    printer.abort();
    Ok(())
}
