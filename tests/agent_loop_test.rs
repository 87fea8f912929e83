//! End-to-end agent-loop scenarios, driven entirely through the public
//! `Agent`/`Model`/`Tool` surface with an in-process mock model.

mod common;

use std::sync::Arc;

use agent_loop_core::{
    Agent, AgentOptions, AgentStreamEvent, ContentBlock, Error, StopReason, Tool, ToolContext,
    ToolRegistry,
};
use common::{text_turn, tool_use_turn, two_tool_use_turn, DelayedMockModel, MockModel};
use futures::StreamExt;
use serde_json::json;

#[tokio::test]
async fn plain_prompt_yields_end_turn_and_records_both_messages() {
    let model = MockModel::new(vec![text_turn("Paris", StopReason::EndTurn)]);
    let agent = Agent::new(
        AgentOptions::builder(Arc::new(model))
            .system_prompt("You are a geography assistant")
            .build()
            .unwrap(),
    );

    let result = agent.invoke("What's the capital of France?").await.unwrap();
    assert_eq!(result.stop_reason, StopReason::EndTurn);
    assert_eq!(result.last_message.unwrap().text(), "Paris");

    let messages = agent.messages().await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].text(), "What's the capital of France?");
}

#[tokio::test]
async fn two_tools_in_one_turn_execute_in_array_order() {
    // Order-sensitive handlers: each appends its name to a shared log, so
    // out-of-order (e.g. parallel) execution would be visible in the log.
    let log = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));

    let make_tool = |name: &'static str, log: Arc<std::sync::Mutex<Vec<String>>>| {
        agent_loop_core::tool(name, "logs its own name")
            .handler(move |_ctx: ToolContext<'_>| {
                let log = log.clone();
                async move {
                    log.lock().unwrap().push(name.to_string());
                    Ok(json!(name))
                }
            })
            .build()
    };

    let first = make_tool("first", log.clone());
    let second = make_tool("second", log.clone());
    let tools =
        ToolRegistry::from_tools(vec![Arc::new(first) as Arc<dyn Tool>, Arc::new(second)]).unwrap();

    let model = MockModel::new(vec![
        two_tool_use_turn([("second", "t2", json!({})), ("first", "t1", json!({}))]),
        text_turn("done", StopReason::EndTurn),
    ]);
    let agent = Agent::new(
        AgentOptions::builder(Arc::new(model))
            .tools(tools)
            .build()
            .unwrap(),
    );

    let result = agent.invoke("go").await.unwrap();
    assert_eq!(result.stop_reason, StopReason::EndTurn);
    // The model requested "second" before "first" in the tool-use array;
    // execution must follow that array order, not registration order.
    assert_eq!(*log.lock().unwrap(), vec!["second", "first"]);
}

#[tokio::test]
async fn unknown_tool_yields_error_result_and_conversation_continues() {
    let model = MockModel::new(vec![
        tool_use_turn("does_not_exist", "t1", json!({})),
        text_turn("recovered", StopReason::EndTurn),
    ]);
    let agent = Agent::new(AgentOptions::builder(Arc::new(model)).build().unwrap());

    let result = agent.invoke("go").await.unwrap();
    assert_eq!(result.stop_reason, StopReason::EndTurn);
    assert_eq!(result.last_message.unwrap().text(), "recovered");

    let messages = agent.messages().await;
    let tool_result = messages[2].tool_results().next().unwrap();
    assert!(tool_result.is_error());
}

#[tokio::test]
async fn structured_output_populates_slot_end_to_end() {
    let schema = json!({
        "type": "object",
        "required": ["answer"],
        "properties": {"answer": {"type": "string"}}
    });
    let model = MockModel::new(vec![
        tool_use_turn("submit_answer", "t1", json!({"answer": "42"})),
        text_turn("Recorded.", StopReason::EndTurn),
    ]);
    let agent = Agent::new(
        AgentOptions::builder(Arc::new(model))
            .structured_output("submit_answer", schema)
            .force_structured_output(true)
            .build()
            .unwrap(),
    );

    let result = agent.invoke("answer please").await.unwrap();
    assert_eq!(result.stop_reason, StopReason::EndTurn);
    assert_eq!(result.structured_output, Some(json!({"answer": "42"})));
}

#[tokio::test]
async fn concurrent_invocation_on_same_agent_fails_synchronously() {
    let model = DelayedMockModel::new(
        vec![text_turn("first", StopReason::EndTurn)],
        std::time::Duration::from_millis(50),
    );
    let agent = Arc::new(Agent::new(
        AgentOptions::builder(Arc::new(model)).build().unwrap(),
    ));

    let a1 = agent.clone();
    let h1 = tokio::spawn(async move { a1.invoke("one").await });

    // The first invocation is now inside its (delayed) model call; a second
    // attempt on the same agent must fail fast rather than queue behind it.
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    let second = agent.invoke("two").await;
    assert!(matches!(second.unwrap_err(), Error::ConcurrentInvocation));

    let first = h1.await.unwrap();
    assert!(first.is_ok());
}

#[tokio::test]
async fn stream_replays_before_and_after_invocation_markers_and_content() {
    let model = MockModel::new(vec![text_turn("hi there", StopReason::EndTurn)]);
    let agent = Agent::new(AgentOptions::builder(Arc::new(model)).build().unwrap());

    let events: Vec<AgentStreamEvent> = agent
        .stream("hello")
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;

    assert!(matches!(events.first(), Some(AgentStreamEvent::BeforeInvocation)));
    assert!(matches!(events.last(), Some(AgentStreamEvent::AfterInvocation)));
    assert!(events
        .iter()
        .any(|e| matches!(e, AgentStreamEvent::ContentBlock(ContentBlock::Text(t)) if t.text == "hi there")));
}
