use crate::config::ColumnMap;
use crate::model::{
    AggregatedPrecinctResult, CoalitionPolicy, PartyCode, PrecinctRawTally, Winner,
};
use std::collections::BTreeSet;

/// Votes belonging to one alliance side: the sum over every column whose
/// component set is a non-empty subset of the side's allowed parties. A
/// joint-ticket column counts only when *every* party on the ticket is declared
/// on that side in this district; partial matches are excluded from both sides.
pub fn side_votes(
    tally: &PrecinctRawTally,
    columns: &ColumnMap,
    allowed: &BTreeSet<PartyCode>,
) -> u64 {
    columns
        .iter()
        .filter(|c| !c.components.is_empty() && c.components.is_subset(allowed))
        .map(|c| tally.vote_count(&c.name))
        .sum()
}

/// Sequential winner selection, compatibility order preserved: side B holds the
/// lead first, side A takes it on a strict majority, then every roster party
/// outside both sides challenges with its solo-column count in roster order.
/// Ties therefore favor the earlier-installed candidate.
pub fn determine_winner(
    tally: &PrecinctRawTally,
    policy: &CoalitionPolicy,
    columns: &ColumnMap,
    roster: &[PartyCode],
    side_a_votes: u64,
    side_b_votes: u64,
) -> (Winner, u64) {
    let mut winner = Winner::SideB;
    let mut winner_votes = side_b_votes;

    if side_a_votes > winner_votes {
        winner = Winner::SideA;
        winner_votes = side_a_votes;
    }

    for party in roster {
        if policy.contains(party) {
            continue;
        }
        let solo_votes = columns
            .solo_column(party)
            .map(|name| tally.vote_count(name))
            .unwrap_or(0);
        if solo_votes > winner_votes {
            winner = Winner::Independent(party.clone());
            winner_votes = solo_votes;
        }
    }

    (winner, winner_votes)
}

/// Turnout as a percentage of the nominal list, one decimal. `None` when the
/// precinct reported no registered voters; never divides by zero.
pub fn participation_percent(total_votes: u64, registered_voters: u64) -> Option<f64> {
    if registered_voters == 0 {
        return None;
    }
    let percent = total_votes as f64 / registered_voters as f64 * 100.0;
    Some((percent * 10.0).round() / 10.0)
}

/// Next-cycle vote goal: the winning total scaled by the growth factor,
/// rounded up. Informational only.
pub fn outreach_target(winner_votes: u64, growth_factor: f64) -> u64 {
    (winner_votes as f64 * growth_factor).ceil() as u64
}

/// Full per-precinct computation. Pure: identical inputs produce an identical
/// result, so precincts may run in any order or in parallel.
pub fn aggregate_precinct(
    tally: &PrecinctRawTally,
    policy: &CoalitionPolicy,
    columns: &ColumnMap,
    roster: &[PartyCode],
    growth_factor: f64,
) -> AggregatedPrecinctResult {
    let side_a = side_votes(tally, columns, &policy.side_a);
    let side_b = side_votes(tally, columns, &policy.side_b);
    let (winner, winner_votes) = determine_winner(tally, policy, columns, roster, side_a, side_b);

    AggregatedPrecinctResult {
        precinct_id: tally.precinct_id,
        district_id: tally.district_id,
        side_a_votes: side_a,
        side_b_votes: side_b,
        winner,
        winner_votes,
        participation_percent: participation_percent(tally.total_votes, tally.registered_voters),
        outreach_target: outreach_target(winner_votes, growth_factor),
        policy_used: policy.clone(),
        tally: tally.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ElectionConfig;
    use std::collections::BTreeMap;

    fn party(code: &str) -> PartyCode {
        PartyCode::new(code)
    }

    fn parties(codes: &[&str]) -> BTreeSet<PartyCode> {
        codes.iter().map(|c| party(c)).collect()
    }

    fn test_config() -> ElectionConfig {
        let json = r#"{
            "roster": ["PAN", "PRI", "PRD", "MORENA", "PVEM", "PT", "MC"],
            "columns": [
                {"name": "PAN"},
                {"name": "PRI"},
                {"name": "PRD"},
                {"name": "PAN-PRI-PRD"},
                {"name": "MORENA"},
                {"name": "PVEM"},
                {"name": "PT"},
                {"name": "MORENA-PT-PVEM"},
                {"name": "MC"}
            ]
        }"#;
        ElectionConfig::from_reader(json.as_bytes()).unwrap()
    }

    fn full_alliance_policy() -> CoalitionPolicy {
        CoalitionPolicy {
            district_id: 5,
            side_a: parties(&["PAN", "PRI", "PRD"]),
            side_b: parties(&["MORENA", "PVEM", "PT"]),
        }
    }

    fn tally_from(pairs: &[(&str, u64)], total: u64, registered: u64) -> PrecinctRawTally {
        let votes: BTreeMap<String, u64> =
            pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        PrecinctRawTally {
            precinct_id: 101,
            district_id: 5,
            votes,
            total_votes: total,
            registered_voters: registered,
        }
    }

    fn scenario_a_tally() -> PrecinctRawTally {
        tally_from(
            &[
                ("PAN", 100),
                ("PRI", 50),
                ("PRD", 20),
                ("PAN-PRI-PRD", 30),
                ("MORENA", 80),
                ("PVEM", 10),
                ("PT", 5),
                ("MORENA-PT-PVEM", 0),
                ("MC", 40),
            ],
            335,
            600,
        )
    }

    #[test]
    fn alliance_totals_include_full_joint_tickets() {
        let config = test_config();
        let policy = full_alliance_policy();
        let tally = scenario_a_tally();

        assert_eq!(side_votes(&tally, &config.columns, &policy.side_a), 200);
        assert_eq!(side_votes(&tally, &config.columns, &policy.side_b), 95);
    }

    #[test]
    fn alliance_side_beats_trailing_independent() {
        let config = test_config();
        let policy = full_alliance_policy();
        let tally = scenario_a_tally();

        let result =
            aggregate_precinct(&tally, &policy, &config.columns, &config.roster, 1.15);
        assert_eq!(result.winner, Winner::SideA);
        assert_eq!(result.winner_votes, 200);
    }

    #[test]
    fn independent_party_overtakes_both_alliances() {
        let config = test_config();
        let policy = full_alliance_policy();
        let mut tally = scenario_a_tally();
        tally.votes.insert("MC".to_string(), 250);

        let (winner, winner_votes) = determine_winner(
            &tally,
            &policy,
            &config.columns,
            &config.roster,
            200,
            95,
        );
        assert_eq!(winner, Winner::Independent(party("MC")));
        assert_eq!(winner_votes, 250);
    }

    #[test]
    fn partial_joint_ticket_excluded_from_side() {
        // Scenario D: PAN-PRI joint votes may not go to a side holding only
        // PAN and PRD, even though PAN is a member.
        let json = r#"{
            "roster": ["PAN", "PRI", "PRD"],
            "columns": [
                {"name": "PAN"},
                {"name": "PRI"},
                {"name": "PRD"},
                {"name": "PAN-PRI"}
            ]
        }"#;
        let config = ElectionConfig::from_reader(json.as_bytes()).unwrap();
        let tally = tally_from(&[("PAN", 10), ("PRD", 5), ("PAN-PRI", 100)], 115, 200);
        let side_a = parties(&["PAN", "PRD"]);

        assert_eq!(side_votes(&tally, &config.columns, &side_a), 15);
    }

    #[test]
    fn conservation_and_excluded_remainder() {
        let config = test_config();
        let policy = full_alliance_policy();
        let tally = scenario_a_tally();

        let side_a = side_votes(&tally, &config.columns, &policy.side_a);
        let side_b = side_votes(&tally, &config.columns, &policy.side_b);
        let column_sum: u64 = config
            .columns
            .iter()
            .map(|c| tally.vote_count(&c.name))
            .sum();
        assert!(side_a + side_b <= column_sum);

        let excluded: u64 = config
            .columns
            .iter()
            .filter(|c| {
                !c.components.is_subset(&policy.side_a)
                    && !c.components.is_subset(&policy.side_b)
            })
            .map(|c| tally.vote_count(&c.name))
            .sum();
        assert_eq!(side_a + side_b + excluded, column_sum);
    }

    #[test]
    fn no_column_counted_on_both_sides() {
        let config = test_config();
        let policy = full_alliance_policy();
        for column in config.columns.iter() {
            let in_a = column.components.is_subset(&policy.side_a);
            let in_b = column.components.is_subset(&policy.side_b);
            assert!(!(in_a && in_b), "column {} counted twice", column.name);
        }
    }

    #[test]
    fn aggregation_is_deterministic() {
        let config = test_config();
        let policy = full_alliance_policy();
        let tally = scenario_a_tally();

        let first = aggregate_precinct(&tally, &policy, &config.columns, &config.roster, 1.15);
        let second = aggregate_precinct(&tally, &policy, &config.columns, &config.roster, 1.15);
        assert_eq!(first.winner, second.winner);
        assert_eq!(first.winner_votes, second.winner_votes);
        assert_eq!(first.side_a_votes, second.side_a_votes);
        assert_eq!(first.side_b_votes, second.side_b_votes);
        assert_eq!(first.outreach_target, second.outreach_target);
    }

    #[test]
    fn default_policy_counts_namesake_columns_only() {
        let config = test_config();
        let policy = CoalitionPolicy {
            district_id: 9,
            side_a: parties(&["PAN"]),
            side_b: parties(&["MORENA"]),
        };
        let tally = scenario_a_tally();

        assert_eq!(side_votes(&tally, &config.columns, &policy.side_a), 100);
        assert_eq!(side_votes(&tally, &config.columns, &policy.side_b), 80);
    }

    #[test]
    fn tie_breaks_favor_earlier_candidate() {
        let config = test_config();
        let policy = full_alliance_policy();
        let tally = scenario_a_tally();

        // Equal sides: side B keeps the lead.
        let (winner, votes) =
            determine_winner(&tally, &policy, &config.columns, &config.roster, 95, 95);
        assert_eq!(winner, Winner::SideB);
        assert_eq!(votes, 95);

        // Independent equal to the installed winner does not take over.
        let (winner, _) =
            determine_winner(&tally, &policy, &config.columns, &config.roster, 40, 30);
        assert_eq!(winner, Winner::SideA);
    }

    #[test]
    fn participation_rounds_to_one_decimal() {
        assert_eq!(participation_percent(1000, 2000), Some(50.0));
        assert_eq!(participation_percent(1, 3), Some(33.3));
        assert_eq!(participation_percent(2, 3), Some(66.7));
    }

    #[test]
    fn zero_registered_voters_yields_sentinel() {
        let config = test_config();
        let policy = full_alliance_policy();
        let tally = tally_from(&[("PAN", 10)], 10, 0);

        let result =
            aggregate_precinct(&tally, &policy, &config.columns, &config.roster, 1.15);
        assert_eq!(result.participation_percent, None);
    }

    #[test]
    fn zero_votes_yields_zero_outreach_target() {
        let config = test_config();
        let policy = full_alliance_policy();
        let tally = tally_from(&[], 0, 100);

        let result =
            aggregate_precinct(&tally, &policy, &config.columns, &config.roster, 1.15);
        assert_eq!(result.winner_votes, 0);
        assert_eq!(result.outreach_target, 0);
    }

    #[test]
    fn outreach_target_rounds_up() {
        assert_eq!(outreach_target(200, 1.15), 230);
        assert_eq!(outreach_target(201, 1.15), 232); // 231.15 -> 232
        assert_eq!(outreach_target(0, 1.15), 0);
    }

    #[test]
    fn independent_without_solo_column_counts_zero() {
        let json = r#"{
            "roster": ["PAN", "MORENA", "NOCOL"],
            "columns": [
                {"name": "PAN"},
                {"name": "MORENA"}
            ]
        }"#;
        let config = ElectionConfig::from_reader(json.as_bytes()).unwrap();
        let policy = CoalitionPolicy {
            district_id: 1,
            side_a: parties(&["PAN"]),
            side_b: parties(&["MORENA"]),
        };
        let tally = tally_from(&[("PAN", 5), ("MORENA", 3)], 8, 20);

        let (winner, votes) =
            determine_winner(&tally, &policy, &config.columns, &config.roster, 5, 3);
        assert_eq!(winner, Winner::SideA);
        assert_eq!(votes, 5);
    }
}
