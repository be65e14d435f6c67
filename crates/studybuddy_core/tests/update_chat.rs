use std::sync::Once;

use pretty_assertions::assert_eq;
use studybuddy_core::{
    update, AppState, ChatRequest, Effect, HistoryEntry, Msg, Role, StreamEvent,
    ASSISTANT_ERROR_MESSAGE,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(studybuddy_logging::initialize_for_tests);
}

fn send(state: AppState, text: &str) -> (AppState, Vec<Effect>) {
    update(state, Msg::SendMessage(text.to_string()))
}

fn chat(state: AppState, turn: u64, event: StreamEvent) -> AppState {
    update(state, Msg::ChatEvent { turn, event }).0
}

fn content(text: &str) -> StreamEvent {
    StreamEvent::Content(text.to_string())
}

#[test]
fn send_message_appends_turn_and_opens_chat() {
    init_logging();
    let (state, _) = update(AppState::new(), Msg::SelectDocument(Some("doc-9".to_string())));
    let (mut state, effects) = send(state, "  Summarise chapter 2 \n");

    assert_eq!(
        effects,
        vec![Effect::OpenChat {
            turn: 1,
            request: ChatRequest {
                query: "Summarise chapter 2".to_string(),
                document_id: Some("doc-9".to_string()),
                conversation_history: Vec::new(),
                n_results: 5,
            },
        }]
    );
    let view = state.view();
    assert!(view.chat_busy);
    assert_eq!(view.messages.len(), 2);
    assert_eq!(view.messages[0].role, Role::User);
    assert_eq!(view.messages[0].content, "Summarise chapter 2");
    assert!(view.messages[1].is_streaming);
    assert!(state.consume_dirty());
}

#[test]
fn blank_message_is_ignored() {
    init_logging();
    let (mut state, effects) = send(AppState::new(), "   ");
    assert!(effects.is_empty());
    assert!(state.view().messages.is_empty());
    assert!(!state.consume_dirty());
}

#[test]
fn second_turn_is_rejected_while_one_is_in_flight() {
    init_logging();
    let (state, _) = send(AppState::new(), "first");
    let (state, effects) = send(state, "second");

    assert!(effects.is_empty());
    let view = state.view();
    assert_eq!(view.messages.len(), 2);
    assert!(view.notice.is_some());
}

#[test]
fn streamed_turn_builds_reply_and_releases_single_flight() {
    init_logging();
    let (state, _) = send(AppState::new(), "question");
    let state = chat(state, 1, content("A"));
    let state = chat(state, 1, content("B"));
    let state = chat(
        state,
        1,
        StreamEvent::Sources {
            sources: Vec::new(),
            context_used: 0,
        },
    );
    let state = chat(state, 1, StreamEvent::Done);
    let (state, _) = update(state, Msg::ChatClosed { turn: 1 });

    let view = state.view();
    assert_eq!(view.messages[1].content, "AB");
    assert!(!view.messages[1].is_streaming);
    assert!(!view.chat_busy);

    let (_state, effects) = send(state, "follow-up");
    match effects.as_slice() {
        [Effect::OpenChat { turn, request }] => {
            assert_eq!(*turn, 2);
            assert_eq!(
                request.conversation_history,
                vec![
                    HistoryEntry {
                        role: Role::User,
                        content: "question".to_string(),
                    },
                    HistoryEntry {
                        role: Role::Assistant,
                        content: "AB".to_string(),
                    },
                ]
            );
        }
        other => panic!("unexpected effects: {other:?}"),
    }
}

#[test]
fn stream_closed_without_done_seals_reply() {
    init_logging();
    let (state, _) = send(AppState::new(), "question");
    let state = chat(state, 1, content("partial but complete"));
    let (state, _) = update(state, Msg::ChatClosed { turn: 1 });

    let view = state.view();
    assert_eq!(view.messages[1].content, "partial but complete");
    assert!(!view.messages[1].is_streaming);
    assert!(!view.chat_busy);
}

#[test]
fn error_event_replaces_reply_with_apology() {
    init_logging();
    let (state, _) = send(AppState::new(), "question");
    let state = chat(state, 1, content("half"));
    let state = chat(state, 1, StreamEvent::Error("malformed record".to_string()));
    let (state, _) = update(state, Msg::ChatClosed { turn: 1 });

    let view = state.view();
    assert_eq!(view.messages[1].content, ASSISTANT_ERROR_MESSAGE);
    assert!(view.messages[1].is_error);
    assert!(!view.chat_busy);
}

#[test]
fn error_after_sources_fails_the_open_turn() {
    init_logging();
    let (state, _) = send(AppState::new(), "question");
    let state = chat(state, 1, content("partial"));
    let state = chat(
        state,
        1,
        StreamEvent::Sources {
            sources: Vec::new(),
            context_used: 0,
        },
    );
    assert_eq!(state.in_flight_turn(), Some(1));

    let state = chat(state, 1, StreamEvent::Error("boom".to_string()));
    let (state, _) = update(state, Msg::ChatClosed { turn: 1 });

    let view = state.view();
    assert_eq!(view.messages[1].content, ASSISTANT_ERROR_MESSAGE);
    assert!(view.messages[1].is_error);
    assert_eq!(view.messages[1].sources, None);
    assert!(!view.chat_busy);
    assert!(state.transcript().history().iter().all(|e| e.content != "partial"));
}

#[test]
fn error_after_close_leaves_the_reply_alone() {
    init_logging();
    let (state, _) = send(AppState::new(), "question");
    let state = chat(state, 1, content("answer"));
    let state = chat(state, 1, StreamEvent::Done);
    let (state, _) = update(state, Msg::ChatClosed { turn: 1 });

    let state = chat(state, 1, StreamEvent::Error("late".to_string()));
    let view = state.view();
    assert_eq!(view.messages[1].content, "answer");
    assert!(!view.messages[1].is_error);
}

#[test]
fn events_after_close_are_dropped() {
    init_logging();
    let (state, _) = send(AppState::new(), "question");
    let state = chat(state, 1, content("done"));
    let (state, _) = update(state, Msg::ChatClosed { turn: 1 });
    let (mut state, _) = send(state, "next");
    state.consume_dirty();

    // A late fragment from turn 1 must not reach turn 2's placeholder.
    let mut state = chat(state, 1, content("late"));
    let view = state.view();
    assert_eq!(view.messages[1].content, "done");
    assert_eq!(view.messages[3].content, "");
    assert!(!state.consume_dirty());
}

#[test]
fn clear_conversation_abandons_open_turn() {
    init_logging();
    let (state, _) = send(AppState::new(), "question");
    let (state, effects) = update(state, Msg::ClearConversation);

    assert_eq!(effects, vec![Effect::AbandonTurn { turn: 1 }]);
    assert!(state.view().messages.is_empty());
    assert!(!state.view().chat_busy);

    let state = chat(state, 1, content("stale"));
    assert!(state.view().messages.is_empty());
}

#[test]
fn n_results_is_forwarded() {
    init_logging();
    let state = AppState::new().with_n_results(8);
    let (_state, effects) = send(state, "q");
    match effects.as_slice() {
        [Effect::OpenChat { request, .. }] => assert_eq!(request.n_results, 8),
        other => panic!("unexpected effects: {other:?}"),
    }
}
