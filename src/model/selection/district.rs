use crate::model::catalog::{Ballot, BallotItem, Candidate};

/// The candidates of `item` offered to a voter in `district`.
///
/// District-scoped ballots only offer the pool whose district name matches
/// exactly; an unknown district yields nothing. Other ballots offer every
/// pool, flattened in catalog order.
pub fn candidates_for<'a>(ballot: &Ballot, item: &'a BallotItem, district: &str) -> Vec<&'a Candidate> {
    item.pools
        .iter()
        .filter(|pool| !ballot.is_district_scoped() || pool.district.name == district)
        .flat_map(|pool| pool.candidates.iter())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::catalog::CandidateId;

    fn ids(candidates: Vec<&Candidate>) -> Vec<CandidateId> {
        candidates.into_iter().map(|candidate| candidate.id).collect()
    }

    #[test]
    fn scoped_ballot_matches_district_exactly() {
        let ballot = Ballot::local();
        let item = ballot.item(1).unwrap();

        assert_eq!(ids(candidates_for(&ballot, item, "ბათუმი")), vec![201, 202, 203]);
        assert_eq!(ids(candidates_for(&ballot, item, "თბილისი")), vec![101, 102, 103]);
        assert!(candidates_for(&ballot, item, "ქუთაისი").is_empty());
        assert!(candidates_for(&ballot, item, " ბათუმი").is_empty());
    }

    #[test]
    fn unscoped_ballot_ignores_district() {
        let ballot = Ballot::parties();
        let item = ballot.item(1).unwrap();

        let everything = ids(candidates_for(&ballot, item, "ბათუმი"));
        assert_eq!(everything, vec![1, 2, 3, 4, 5]);
        assert_eq!(ids(candidates_for(&ballot, item, "")), everything);
    }

    #[test]
    fn item_without_pools_is_empty() {
        let ballot = Ballot::parties();
        let decline = ballot.item(2).unwrap();
        assert!(candidates_for(&ballot, decline, "თბილისი").is_empty());
    }
}
