//! Cooperative interrupt scenarios: raising a pause from a `BeforeToolCall`
//! hook, resuming it, and the various malformed-resume failure paths.

mod common;

use std::sync::Arc;

use agent_loop_core::{Agent, AgentOptions, Error, StopReason, Tool, ToolContext, ToolRegistry};
use common::{text_turn, tool_use_turn, MockModel};
use serde_json::json;

fn approval_agent(turns: Vec<Vec<agent_loop_core::ModelStreamEvent>>) -> Agent {
    let tool = agent_loop_core::tool("send_email", "sends an email")
        .handler(|_ctx: ToolContext<'_>| async move { Ok(json!("sent")) })
        .build();
    let tools = ToolRegistry::from_tools(vec![Arc::new(tool) as Arc<dyn Tool>]).unwrap();
    let model = MockModel::new(turns);
    let mut agent = Agent::new(
        AgentOptions::builder(Arc::new(model))
            .tools(tools)
            .build()
            .unwrap(),
    );
    agent.hooks_mut().on_before_tool_call(|event| {
        if event.tool_use.name == "send_email" {
            event.interrupt("confirm_send", Some(json!({"to": "a@example.com"})));
        }
        Ok(())
    });
    agent
}

#[tokio::test]
async fn tool_call_interrupt_pauses_and_resume_completes_the_turn() {
    let agent = approval_agent(vec![
        tool_use_turn("send_email", "t1", json!({"to": "a@example.com"})),
        text_turn("Email sent.", StopReason::EndTurn),
    ]);

    let paused = agent.invoke("email the report").await.unwrap();
    assert_eq!(paused.stop_reason, StopReason::Interrupt);
    assert_eq!(paused.interrupts.len(), 1);
    assert_eq!(paused.interrupts[0].name, "confirm_send");
    let id = paused.interrupts[0].id.clone();

    // While paused, the tool's own result message records the synthetic
    // "interrupted" placeholder, not a real tool result.
    let messages = agent.messages().await;
    let placeholder = messages.last().unwrap().tool_results().next().unwrap();
    assert!(placeholder.is_error());

    let resume = json!([{"interrupt_response": {"interrupt_id": id, "response": "yes"}}]);
    let resumed = agent.invoke(resume).await.unwrap();
    assert_eq!(resumed.stop_reason, StopReason::EndTurn);
    assert_eq!(resumed.last_message.unwrap().text(), "Email sent.");
}

#[tokio::test]
async fn resume_with_unknown_interrupt_id_is_rejected() {
    let agent = approval_agent(vec![tool_use_turn(
        "send_email",
        "t1",
        json!({"to": "a@example.com"}),
    )]);

    let paused = agent.invoke("email the report").await.unwrap();
    assert_eq!(paused.stop_reason, StopReason::Interrupt);

    let bogus = json!([{"interrupt_response": {"interrupt_id": "not-a-real-id", "response": "yes"}}]);
    let err = agent.invoke(bogus).await.unwrap_err();
    assert!(matches!(err, Error::UnknownInterruptId(_)));
}

#[tokio::test]
async fn resume_with_malformed_shape_is_rejected() {
    let agent = approval_agent(vec![tool_use_turn(
        "send_email",
        "t1",
        json!({"to": "a@example.com"}),
    )]);

    agent.invoke("email the report").await.unwrap();

    let err = agent.invoke(json!({"not": "an array"})).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInterruptResume(_)));
}

#[tokio::test]
async fn duplicate_interrupt_names_in_one_turn_are_rejected() {
    let tool_a = agent_loop_core::tool("tool_a", "a")
        .handler(|_ctx: ToolContext<'_>| async move { Ok(json!("a")) })
        .build();
    let tool_b = agent_loop_core::tool("tool_b", "b")
        .handler(|_ctx: ToolContext<'_>| async move { Ok(json!("b")) })
        .build();
    let tools = ToolRegistry::from_tools(vec![
        Arc::new(tool_a) as Arc<dyn Tool>,
        Arc::new(tool_b) as Arc<dyn Tool>,
    ])
    .unwrap();

    let model = MockModel::new(vec![common::two_tool_use_turn([
        ("tool_a", "t1", json!({})),
        ("tool_b", "t2", json!({})),
    ])]);
    let mut agent = Agent::new(
        AgentOptions::builder(Arc::new(model))
            .tools(tools)
            .build()
            .unwrap(),
    );
    // Both tool calls request the same interrupt name — a caller bug the
    // agent must surface, not silently dedupe.
    agent.hooks_mut().on_before_tool_call(|event| {
        event.interrupt("same_name", None);
        Ok(())
    });

    let err = agent.invoke("go").await.unwrap_err();
    assert!(matches!(err, Error::DuplicateInterruptName(_)));
}

#[tokio::test]
async fn cancel_tool_skips_execution_without_raising_an_interrupt() {
    let tool = agent_loop_core::tool("dangerous", "does something risky")
        .handler(|_ctx: ToolContext<'_>| async move { Ok(json!("should not run")) })
        .build();
    let tools = ToolRegistry::from_tools(vec![Arc::new(tool) as Arc<dyn Tool>]).unwrap();
    let model = MockModel::new(vec![
        tool_use_turn("dangerous", "t1", json!({})),
        text_turn("blocked", StopReason::EndTurn),
    ]);
    let mut agent = Agent::new(
        AgentOptions::builder(Arc::new(model))
            .tools(tools)
            .build()
            .unwrap(),
    );
    agent.hooks_mut().on_before_tool_call(|event| {
        event.cancel_tool = Some("not permitted".to_string());
        Ok(())
    });

    let result = agent.invoke("do it").await.unwrap();
    assert_eq!(result.stop_reason, StopReason::EndTurn);
    let messages = agent.messages().await;
    let tool_result = messages[2].tool_results().next().unwrap();
    assert!(tool_result.is_error());
}
