use crate::{AppState, Effect, Msg};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::UploadRequested { path } => {
            if !is_pdf(&path) {
                state.set_notice(format!("Only PDF files are supported: {}", path.display()));
                return (state, Vec::new());
            }
            if !state.begin_upload(path.clone()) {
                state.set_notice("A document is already being processed");
                return (state, Vec::new());
            }
            state.clear_notice();
            vec![Effect::UploadFile { path }]
        }
        Msg::UploadAccepted(task) => {
            let task_id = task.task_id.clone();
            if state.accept_upload(task) {
                vec![Effect::PollTask { task_id }]
            } else {
                Vec::new()
            }
        }
        Msg::UploadRejected { message } => {
            state.reject_upload(message);
            Vec::new()
        }
        Msg::TaskProgress { task_id, snapshot } => {
            state.apply_snapshot(&task_id, snapshot);
            Vec::new()
        }
        Msg::TaskCompleted { task_id, result } => {
            state.complete_task(&task_id, result);
            Vec::new()
        }
        Msg::TaskFailed { task_id, message } => {
            state.fail_task(&task_id, message);
            Vec::new()
        }
        Msg::CancelTask => match state.abandon_task() {
            Some(task_id) => {
                state.set_notice("Processing cancelled");
                vec![Effect::AbandonTask { task_id }]
            }
            None => Vec::new(),
        },
        Msg::SelectDocument(document_id) => {
            state.select_document(document_id);
            Vec::new()
        }
        Msg::SendMessage(text) => {
            let query = text.trim();
            if query.is_empty() {
                return (state, Vec::new());
            }
            match state.begin_turn(query.to_string()) {
                Some((turn, request)) => {
                    state.clear_notice();
                    vec![Effect::OpenChat { turn, request }]
                }
                None => {
                    state.set_notice("Wait for the current answer to finish");
                    Vec::new()
                }
            }
        }
        Msg::ChatEvent { turn, event } => {
            state.apply_chat_event(turn, &event);
            Vec::new()
        }
        Msg::ChatClosed { turn } => {
            state.close_turn(turn);
            Vec::new()
        }
        Msg::ClearConversation => match state.clear_conversation() {
            Some(turn) => vec![Effect::AbandonTurn { turn }],
            None => Vec::new(),
        },
        Msg::RefreshDocuments => vec![Effect::ListDocuments],
        Msg::DocumentsLoaded(documents) => {
            state.load_documents(documents);
            Vec::new()
        }
        Msg::DeleteDocument { document_id } => vec![Effect::DeleteDocument { document_id }],
        Msg::DocumentDeleted { document_id } => {
            state.remove_document(&document_id);
            Vec::new()
        }
        Msg::RequestFailed { message } => {
            state.set_notice(message);
            Vec::new()
        }
        Msg::Tick | Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn is_pdf(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
