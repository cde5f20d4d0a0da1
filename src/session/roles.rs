use crate::types::{Participant, Role};
use rand::Rng;

/// Clear every role, then make one uniformly chosen participant the saboteur.
///
/// Returns the saboteur's index, or `None` when there is nobody to assign.
pub fn assign_roles<R: Rng + ?Sized>(participants: &mut [Participant], rng: &mut R) -> Option<usize> {
    for p in participants.iter_mut() {
        p.role = None;
    }

    if participants.is_empty() {
        return None;
    }

    let saboteur = rng.random_range(0..participants.len());
    for (i, p) in participants.iter_mut().enumerate() {
        p.role = Some(if i == saboteur {
            Role::Saboteur
        } else {
            Role::Regular
        });
    }

    Some(saboteur)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn roster(n: usize) -> Vec<Participant> {
        (0..n)
            .map(|i| Participant::new(format!("c{}", i), format!("P{}", i), i == 0))
            .collect()
    }

    #[test]
    fn test_exactly_one_saboteur() {
        let mut rng = StdRng::seed_from_u64(5);
        for n in 1..=5 {
            let mut players = roster(n);
            let idx = assign_roles(&mut players, &mut rng).unwrap();

            let saboteurs: Vec<_> = players
                .iter()
                .filter(|p| p.role == Some(Role::Saboteur))
                .collect();
            assert_eq!(saboteurs.len(), 1);
            assert_eq!(saboteurs[0].id, players[idx].id);
            assert!(players.iter().all(|p| p.role.is_some()));
        }
    }

    #[test]
    fn test_rerun_resets_previous_roles() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut players = roster(4);
        for p in players.iter_mut() {
            p.role = Some(Role::Saboteur);
        }

        assign_roles(&mut players, &mut rng);
        assign_roles(&mut players, &mut rng);

        let count = players
            .iter()
            .filter(|p| p.role == Some(Role::Saboteur))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_empty_roster() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut players: Vec<Participant> = Vec::new();
        assert_eq!(assign_roles(&mut players, &mut rng), None);
    }

    #[test]
    fn test_every_seat_can_be_picked() {
        let mut rng = StdRng::seed_from_u64(2024);
        let mut hits = [0u32; 3];
        for _ in 0..600 {
            let mut players = roster(3);
            hits[assign_roles(&mut players, &mut rng).unwrap()] += 1;
        }
        assert!(hits.iter().all(|h| *h > 100), "hits: {:?}", hits);
    }
}
