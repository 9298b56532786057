use crate::event::Sender;

/// Longest title the workspace accepts for a thread, in characters.
pub const MAX_TITLE_CHARS: usize = 128;

/// Build a workspace thread title from a user's profile.
///
/// `"<first> <last> @<username>"` with absent parts dropped, `"User"` when
/// nothing is known.
pub fn thread_title(sender: &Sender) -> String {
    let name = [Some(sender.first_name.as_str()), sender.last_name.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let handle = sender
        .username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(|u| format!("@{u}"));

    let title = match (name.is_empty(), handle) {
        (false, Some(handle)) => format!("{name} {handle}"),
        (true, Some(handle)) => handle,
        (false, None) => name,
        (true, None) => "User".to_string(),
    };
    title.chars().take(MAX_TITLE_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, topicbridge_common::types::UserId};

    fn sender(first: &str, last: Option<&str>, username: Option<&str>) -> Sender {
        Sender {
            id: UserId(1),
            is_bot: false,
            first_name: first.into(),
            last_name: last.map(Into::into),
            username: username.map(Into::into),
        }
    }

    #[rstest]
    #[case("Ada", Some("Lovelace"), Some("ada"), "Ada Lovelace @ada")]
    #[case("Ada", None, Some("ada"), "Ada @ada")]
    #[case("", None, Some("ada"), "@ada")]
    #[case("Ada", Some("Lovelace"), None, "Ada Lovelace")]
    #[case("", None, None, "User")]
    #[case("  ", Some(" "), Some(""), "User")]
    fn builds_title(
        #[case] first: &str,
        #[case] last: Option<&str>,
        #[case] username: Option<&str>,
        #[case] expected: &str,
    ) {
        assert_eq!(thread_title(&sender(first, last, username)), expected);
    }

    #[test]
    fn truncates_long_titles_on_char_boundaries() {
        let long = "é".repeat(200);
        let title = thread_title(&sender(&long, None, None));
        assert_eq!(title.chars().count(), MAX_TITLE_CHARS);
    }
}
