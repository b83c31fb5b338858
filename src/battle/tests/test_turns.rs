use crate::battle::opponent::Opponent;
use crate::battle::rng::TurnRng;
use crate::battle::session::{BattleSession, PlayerAction};
use crate::battle::state::{BattleEvent, EndReason, SessionPhase, Side};
use crate::battle::tests::common::{session_against, test_trainer, wild_session, TestCombatantBuilder};
use crate::combatant::Combatant;
use crate::errors::{BattleError, ValidationError};
use crate::ids::TrainerId;
use crate::roster::Trainer;
use pretty_assertions::assert_eq;
use schema::{Move, StageStat, StatusCondition};

const PLAYER: TrainerId = TrainerId(1);

fn joined(mut session: BattleSession, squad: Vec<Combatant>) -> (BattleSession, Trainer) {
    let mut trainer = test_trainer(PLAYER.0, squad);
    if let Err(err) = session.join(&mut trainer, None) {
        panic!("join failed: {}", err);
    }
    (session, trainer)
}

fn fight(session: &mut BattleSession, move_index: usize, rng: &mut TurnRng) -> Vec<BattleEvent> {
    match session.submit_action(PLAYER, PlayerAction::Fight { move_index }, rng) {
        Ok(bus) => bus.events().to_vec(),
        Err(err) => panic!("fight was rejected: {}", err),
    }
}

#[test]
fn faster_wild_opponent_knocks_out_the_last_combatant() {
    let wild = TestCombatantBuilder::new(19, 10).with_moves(vec![Move::Tackle]).build();
    let pikachu = TestCombatantBuilder::new(25, 5)
        .with_moves(vec![Move::Tackle])
        .with_hp(1)
        .build();
    let (mut session, mut trainer) = joined(wild_session(wild), vec![pikachu]);
    // wild move choice, accuracy, variance
    let mut rng = TurnRng::new_for_test(vec![1, 1, 50]);

    let events = fight(&mut session, 0, &mut rng);

    assert_eq!(session.phase(), SessionPhase::Terminal(EndReason::Loss));
    let player_moved = events
        .iter()
        .any(|e| matches!(e, BattleEvent::MoveUsed { side: Side::Player, .. }));
    assert!(!player_moved, "a fainted combatant must not act");
    assert!(events.contains(&BattleEvent::Fainted {
        side: Side::Player,
        name: "PIKACHU".to_string(),
    }));
    assert_eq!(events.last(), Some(&BattleEvent::BattleEnded { reason: EndReason::Loss }));

    let settlement = session.settle(&mut TurnRng::new_for_test(vec![]));
    trainer.leave_battle(settlement.squad.unwrap());
    assert_eq!(trainer.squad()[0].as_ref().unwrap().hp(), 0);
    assert!(!trainer.in_battle());
}

#[test]
fn knocking_out_a_wild_opponent_wins_and_spends_pp() {
    let wild = TestCombatantBuilder::new(1, 3)
        .with_moves(vec![Move::Tackle])
        .with_hp(1)
        .build();
    let charmander = TestCombatantBuilder::new(4, 20).with_moves(vec![Move::Ember]).build();
    let (mut session, mut trainer) = joined(wild_session(wild), vec![charmander]);
    // wild move choice, accuracy, variance; no burn roll for a fainting target
    let mut rng = TurnRng::new_for_test(vec![1, 1, 50]);

    let events = fight(&mut session, 0, &mut rng);

    assert_eq!(session.phase(), SessionPhase::Terminal(EndReason::Win));
    assert!(events.contains(&BattleEvent::TypeEffectiveness { multiplier: 2.0 }));
    assert!(!events
        .iter()
        .any(|e| matches!(e, BattleEvent::MoveUsed { side: Side::Opponent, .. })));
    assert!(!events.iter().any(|e| matches!(e, BattleEvent::StatusApplied { .. })));

    let settlement = session.settle(&mut TurnRng::new_for_test(vec![]));
    assert_eq!(settlement.captured, None);
    trainer.leave_battle(settlement.squad.unwrap());
    let ember = trainer.squad()[0].as_ref().unwrap().moves[0].as_ref().unwrap();
    assert_eq!(ember.pp, ember.max_pp() - 1);
}

#[test]
fn flinched_opponent_loses_its_move() {
    let wild = TestCombatantBuilder::new(74, 10).with_moves(vec![Move::Tackle]).build();
    let rattata = TestCombatantBuilder::new(19, 5).with_moves(vec![Move::Bite]).build();
    let (mut session, _trainer) = joined(wild_session(wild), vec![rattata]);
    // wild move choice, accuracy, variance, flinch
    let mut rng = TurnRng::new_for_test(vec![1, 1, 1, 1]);

    let events = fight(&mut session, 0, &mut rng);

    assert!(events.contains(&BattleEvent::Flinched {
        name: "Wild GEODUDE".to_string(),
    }));
    assert!(!events
        .iter()
        .any(|e| matches!(e, BattleEvent::MoveUsed { side: Side::Opponent, .. })));
    let geodude = session.active(Side::Opponent).unwrap();
    assert!(!geodude.volatile.flinched);
    assert_eq!(geodude.moves[0].as_ref().unwrap().pp, 35);
    let rattata = session.active(Side::Player).unwrap();
    assert_eq!(rattata.hp(), rattata.max_hp());
    assert_eq!(session.turn_number(), 2);
    assert_eq!(session.phase(), SessionPhase::AwaitingActions);
}

#[test]
fn poison_ticks_after_both_moves() {
    let wild = TestCombatantBuilder::new(129, 5).with_moves(vec![Move::Splash]).build();
    let pikachu = TestCombatantBuilder::new(25, 10)
        .with_moves(vec![Move::Growl])
        .with_status(StatusCondition::Poisoned)
        .build();
    let (mut session, _trainer) = joined(wild_session(wild), vec![pikachu]);
    // wild move choice, Growl accuracy; Splash never misses
    let mut rng = TurnRng::new_for_test(vec![1, 1]);

    let events = fight(&mut session, 0, &mut rng);

    let magikarp = session.active(Side::Opponent).unwrap();
    assert_eq!(magikarp.stages.get(StageStat::Attack), -1);
    assert!(events.contains(&BattleEvent::MoveFailed));

    let residual_at = events
        .iter()
        .position(|e| matches!(e, BattleEvent::ResidualDamage { .. }))
        .expect("poison should tick");
    let last_move_at = events
        .iter()
        .rposition(|e| matches!(e, BattleEvent::MoveUsed { .. }))
        .unwrap();
    assert!(residual_at > last_move_at);
    assert_eq!(
        events[residual_at],
        BattleEvent::ResidualDamage {
            target: "PIKACHU".to_string(),
            status: StatusCondition::Poisoned,
            damage: 3,
        }
    );
    assert_eq!(session.active(Side::Player).unwrap().hp(), 24);
    assert!(matches!(events.last(), Some(BattleEvent::Prompt { .. })));
}

#[test]
fn trainer_sends_the_next_member_after_a_faint() {
    let foe = Opponent::trainer(
        "BUG CATCHER RICK",
        vec![
            TestCombatantBuilder::new(13, 3)
                .with_moves(vec![Move::Tackle])
                .with_hp(1)
                .build(),
            TestCombatantBuilder::new(10, 3).with_moves(vec![Move::Tackle]).build(),
        ],
    );
    let charmander = TestCombatantBuilder::new(4, 20).with_moves(vec![Move::Ember]).build();
    let (mut session, _trainer) = joined(session_against(foe), vec![charmander]);
    // trainer AI uses no rolls: accuracy, variance
    let mut rng = TurnRng::new_for_test(vec![1, 50]);

    let events = fight(&mut session, 0, &mut rng);

    assert!(events.contains(&BattleEvent::SentOut {
        side: Side::Opponent,
        trainer: "BUG CATCHER RICK".to_string(),
        name: "CATERPIE".to_string(),
    }));
    assert_eq!(session.phase(), SessionPhase::AwaitingActions);
    assert_eq!(session.label(Side::Opponent), "Foe CATERPIE");
}

#[test]
fn fainted_player_must_send_a_replacement_before_fighting() {
    let wild = TestCombatantBuilder::new(19, 10).with_moves(vec![Move::Tackle]).build();
    let squad = vec![
        TestCombatantBuilder::new(25, 5)
            .with_moves(vec![Move::Tackle])
            .with_hp(1)
            .build(),
        TestCombatantBuilder::new(16, 5).with_moves(vec![Move::Tackle]).build(),
    ];
    let (mut session, _trainer) = joined(wild_session(wild), squad);
    let mut rng = TurnRng::new_for_test(vec![1, 1, 50]);

    let events = fight(&mut session, 0, &mut rng);

    assert!(events.contains(&BattleEvent::ReplacementNeeded {
        trainer: "TRAINER1".to_string(),
    }));
    assert!(session.is_awaiting_replacement());
    assert_eq!(session.phase(), SessionPhase::AwaitingActions);

    let mut no_rolls = TurnRng::new_for_test(vec![]);
    let err = session
        .submit_action(PLAYER, PlayerAction::Fight { move_index: 0 }, &mut no_rolls)
        .unwrap_err();
    assert!(matches!(err, BattleError::Validation(ValidationError::ReplacementRequired)));
    let err = session
        .submit_action(PLAYER, PlayerAction::Switch { target_index: 0 }, &mut no_rolls)
        .unwrap_err();
    assert!(matches!(
        err,
        BattleError::Validation(ValidationError::CombatantCannotBattle(_))
    ));

    let bus = session
        .submit_action(PLAYER, PlayerAction::Switch { target_index: 1 }, &mut no_rolls)
        .unwrap();
    assert_eq!(bus.narrate()[0], "Go! PIDGEY!");
    assert!(!session.is_awaiting_replacement());
    assert_eq!(session.label(Side::Player), "PIDGEY");
    assert_eq!(session.turn_number(), 2);
}

#[test]
fn switching_happens_before_the_opponent_moves() {
    let wild = TestCombatantBuilder::new(129, 5).with_moves(vec![Move::Splash]).build();
    let squad = vec![
        TestCombatantBuilder::new(25, 10).with_moves(vec![Move::Growl]).build(),
        TestCombatantBuilder::new(74, 10).with_moves(vec![Move::Tackle]).build(),
    ];
    let (mut session, _trainer) = joined(wild_session(wild), squad);
    let mut rng = TurnRng::new_for_test(vec![1]);

    let bus = session
        .submit_action(PLAYER, PlayerAction::Switch { target_index: 1 }, &mut rng)
        .unwrap();

    let narration = bus.narrate();
    assert_eq!(narration[0], "PIKACHU, come back!");
    assert_eq!(narration[1], "Go! GEODUDE!");
    assert_eq!(narration[2], "Wild MAGIKARP used SPLASH!\nBut it failed!");
    assert_eq!(session.label(Side::Player), "GEODUDE");
}
