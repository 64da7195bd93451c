use crate::model::{Effect, Play};

/// Effect a region shows at a cue, together with the cue that owns it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved<'a> {
    pub effect: &'a Effect,
    pub owner_index: usize,
}

/// Finds the effect a region shows at `cue_index`: the nearest cue at or
/// before that index that assigns the region an effect. Returns `None` when
/// the region is not part of the play or no cue ever owns it.
pub fn resolve_effect<'a>(play: &'a Play, cue_index: usize, region_id: &str) -> Option<&'a Effect> {
    resolve(play, cue_index, region_id).map(|resolved| resolved.effect)
}

/// Like [`resolve_effect`] but also reports which cue owns the effect.
pub fn resolve<'a>(play: &'a Play, cue_index: usize, region_id: &str) -> Option<Resolved<'a>> {
    play.region(region_id)?;
    let last = cue_index.min(play.cues.len().checked_sub(1)?);
    play.cues[..=last]
        .iter()
        .enumerate()
        .rev()
        .find_map(|(index, cue)| {
            cue.effects_by_region.get(region_id).map(|effect| Resolved {
                effect,
                owner_index: index,
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::*;

    fn color_of(effect: &Effect) -> &str {
        effect.params["color"].as_str().unwrap()
    }

    #[test]
    fn returns_own_effect_when_owned() {
        let play = tracking_play();
        let effect = resolve_effect(&play, 0, "r-1").unwrap();
        assert_eq!(color_of(effect), "#ff0000");
    }

    #[test]
    fn walks_back_one_cue() {
        let play = tracking_play();
        assert_eq!(color_of(resolve_effect(&play, 1, "r-1").unwrap()), "#ff0000");
    }

    #[test]
    fn walks_back_through_chain() {
        let play = tracking_play();
        let resolved = resolve(&play, 2, "r-1").unwrap();
        assert_eq!(color_of(resolved.effect), "#ff0000");
        assert_eq!(resolved.owner_index, 0);
    }

    #[test]
    fn nearest_owner_wins_over_oldest() {
        let play = tracking_play();
        let resolved = resolve(&play, 2, "r-2").unwrap();
        assert_eq!(color_of(resolved.effect), "#00ff00");
        assert_eq!(resolved.owner_index, 1);
    }

    #[test]
    fn never_owned_region_resolves_to_none() {
        let mut play = tracking_play();
        play.regions.push(region("r-3", "ch-1", &[(0, 0)]));
        play.cues[1].tracking_regions.insert("r-3".into());
        for index in 0..play.cues.len() {
            assert!(resolve_effect(&play, index, "r-3").is_none());
        }
    }

    #[test]
    fn unknown_region_resolves_to_none() {
        let mut play = tracking_play();
        play.cues[0]
            .effects_by_region
            .insert("ghost".into(), static_color("e-9", "#ffffff"));
        assert!(resolve_effect(&play, 0, "ghost").is_none());
    }

    #[test]
    fn index_past_the_end_clamps_to_last_cue() {
        let play = tracking_play();
        assert_eq!(color_of(resolve_effect(&play, 99, "r-2").unwrap()), "#00ff00");
        assert!(resolve_effect(&Play::default(), 0, "r-1").is_none());
    }
}
