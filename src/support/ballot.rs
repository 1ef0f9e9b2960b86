use crate::db::schema::Vote;

/// Builds a ballot from labels in the order the participant picked them:
/// the first pick gets rank 1, the next rank 2, and so on.
pub fn votes_from_selection<S: AsRef<str>>(selection: &[S]) -> Vec<Vote> {
    selection
        .iter()
        .enumerate()
        .map(|(i, choice)| Vote::new(choice.as_ref().trim(), i as i64 + 1))
        .collect()
}
