//! List Stream (component C9): a lazy sequence over a paginated collection,
//! walking `metadata.continue` tokens transparently (§4.9).
use std::collections::VecDeque;

use futures::{stream, Stream};
use kubeop_core::{dynamic, Operation};
use serde_json::Value;

use crate::{connection::Connection, error::Error, runner};

enum State {
    /// Not yet fetched a page.
    Start,
    /// Buffered items from the current page, plus the token for the next one.
    Page {
        buffer: VecDeque<Value>,
        next_token: Option<String>,
    },
    /// A page fetch failed; the stream already yielded the error.
    Failed,
}

/// Stream every item of the collection `op` targets, issuing additional
/// `GET`s as each page's `metadata.continue` token is consumed. A fetch
/// failure is surfaced as the stream's final `Err` element (§8 prop 9).
///
/// If `op` carries a path `name`, it is folded into a
/// `fieldSelector=metadata.name={name}` query parameter and dropped from the
/// path, so a `get`-by-name behaves as a list of at most one item (§4.9).
pub fn list(conn: Connection, op: Operation) -> impl Stream<Item = Result<Value, Error>> {
    let op = fold_name_into_field_selector(op);
    stream::unfold((conn, op, State::Start), |(conn, op, state)| async move {
        step(conn, op, state).await
    })
}

fn fold_name_into_field_selector(op: Operation) -> Operation {
    let Some(name) = op.path_params().name.clone() else {
        return op;
    };
    let field_selector = format!("metadata.name={name}");
    let mut path_params = op.path_params().clone();
    path_params.name = None;
    op.with_path_params(path_params).put_query_param("fieldSelector", field_selector)
}

async fn step(
    conn: Connection,
    op: Operation,
    mut state: State,
) -> Option<(Result<Value, Error>, (Connection, Operation, State))> {
    loop {
        match state {
            State::Start => match fetch_page(&conn, &op, None).await {
                Ok((buffer, next_token)) => state = State::Page { buffer, next_token },
                Err(e) => return Some((Err(e), (conn, op, State::Failed))),
            },
            State::Page { mut buffer, next_token } => {
                if let Some(item) = buffer.pop_front() {
                    return Some((Ok(item), (conn, op, State::Page { buffer, next_token })));
                }
                match next_token {
                    Some(token) => match fetch_page(&conn, &op, Some(token)).await {
                        Ok((buffer, next_token)) => state = State::Page { buffer, next_token },
                        Err(e) => return Some((Err(e), (conn, op, State::Failed))),
                    },
                    None => return None,
                }
            }
            State::Failed => return None,
        }
    }
}

async fn fetch_page(
    conn: &Connection,
    op: &Operation,
    continue_token: Option<String>,
) -> Result<(VecDeque<Value>, Option<String>), Error> {
    let op = match continue_token {
        Some(token) => op.clone().put_query_param("continue", token),
        None => op.clone(),
    };
    let page = runner::run(conn, &op).await?;
    let buffer: VecDeque<Value> = dynamic::items(&page).iter().cloned().collect();
    let next_token = dynamic::continue_token(&page).map(str::to_string);
    Ok((buffer, next_token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn items_and_continue_token_read_from_a_list_page() {
        let page = json!({
            "metadata": {"continue": "tok-2"},
            "items": [{"metadata": {"name": "a"}}, {"metadata": {"name": "b"}}],
        });
        let buffer: VecDeque<Value> = dynamic::items(&page).iter().cloned().collect();
        assert_eq!(buffer.len(), 2);
        assert_eq!(dynamic::continue_token(&page), Some("tok-2"));
    }

    #[test]
    fn final_page_has_no_continue_token() {
        let page = json!({"metadata": {}, "items": [{"metadata": {"name": "a"}}]});
        assert_eq!(dynamic::continue_token(&page), None);
    }

    #[test]
    fn get_by_name_folds_into_field_selector_and_drops_path_name() {
        use kubeop_core::operation::{PathParams, Verb};

        let op = Operation::build(Verb::List, "v1", "Pod", PathParams::namespaced("default", "nginx"), None);
        let folded = fold_name_into_field_selector(op);
        assert_eq!(folded.path_params().name, None);
        assert_eq!(folded.path_params().namespace.as_deref(), Some("default"));
        assert_eq!(
            folded.query_params().get("fieldSelector"),
            Some(&kubeop_core::operation::QueryValue::Str("metadata.name=nginx".to_string()))
        );
    }

    #[test]
    fn list_without_a_name_is_unchanged() {
        use kubeop_core::operation::Verb;

        let op = Operation::build(Verb::List, "v1", "Pod", Default::default(), None);
        let folded = fold_name_into_field_selector(op.clone());
        assert_eq!(folded, op);
    }
}
