use std::collections::VecDeque;

use super::{LightField, LightQueues, MAX_LIGHT, MIN_LIGHT, current};
use crate::world::block::BlockId;
use crate::world::chunk::LightChannel;
use crate::world::position::LocalPos;

/// Breadth-first spread from every queued position.
///
/// Each node passes `current - step(block)` to its non-opaque neighbors that
/// are darker than that. The queue is empty on return.
pub fn scatter<F: LightField + ?Sized>(field: &mut F, channel: LightChannel, queue: &mut VecDeque<LocalPos>) {
    while let Some(pos) = queue.pop_front() {
        let Some(block) = field.block(pos) else {
            continue;
        };
        let Some(here) = current(field, channel, pos) else {
            continue;
        };
        let light = here.saturating_sub(block.light_step());
        if light <= MIN_LIGHT {
            continue;
        }
        for n in pos.neighbors() {
            match field.block(n) {
                Some(nb) if !nb.is_opaque() => {}
                _ => continue,
            }
            if current(field, channel, n).is_some_and(|v| v < light) {
                field.store(channel, n, light);
                queue.push_back(n);
            }
        }
    }
}

/// Two-queue light removal.
///
/// Every removal node carries the value it held before. Neighbors at or below
/// `old - 1` were lit through it and are darkened in turn; brighter neighbors
/// are lit from elsewhere and go to the border queue, which is scattered once
/// removal finishes so they refill the darkened region. Emitters reached by
/// the removal are re-seeded.
pub fn remove<F: LightField + ?Sized>(
    field: &mut F,
    channel: LightChannel,
    removal: &mut VecDeque<(LocalPos, u8)>,
    border: &mut VecDeque<LocalPos>,
) {
    while let Some((pos, old)) = removal.pop_front() {
        let Some(block) = field.block(pos) else {
            continue;
        };
        let light = old.saturating_sub(1);
        field.store(channel, pos, MIN_LIGHT);

        if channel == LightChannel::Block && block.light_emitted() > MIN_LIGHT {
            field.store(channel, pos, block.light_emitted());
            border.push_back(pos);
        }

        for n in pos.neighbors() {
            let Some(value) = current(field, channel, n) else {
                continue;
            };
            if value <= MIN_LIGHT {
                continue;
            }
            let implicit_sun = channel == LightChannel::Sun && n.y >= field.surface(n);
            if value <= light && !implicit_sun {
                field.store(channel, n, MIN_LIGHT);
                removal.push_back((n, value));
            } else {
                border.push_back(n);
            }
        }
    }
    scatter(field, channel, border);
}

/// Repair both channels after the block at `pos` changed from `old` to `new`.
///
/// The new block must already be written to the field. The column surface is
/// recomputed here.
pub fn relight_edit<F: LightField + ?Sized>(
    field: &mut F,
    pos: LocalPos,
    old: BlockId,
    new: BlockId,
    queues: &mut LightQueues,
) {
    relight_sun(field, pos, old, new, queues);
    relight_block(field, pos, new, queues);
    debug_assert!(queues.is_empty());
}

fn relight_sun<F: LightField + ?Sized>(
    field: &mut F,
    pos: LocalPos,
    old: BlockId,
    new: BlockId,
    queues: &mut LightQueues,
) {
    let ch = LightChannel::Sun;
    let (old_surface, new_surface) = field.recompute_surface(pos);

    if new_surface > old_surface {
        // Formerly implicit cells are now shadowed.
        for y in old_surface..new_surface {
            let cell = LocalPos::new(pos.x, y, pos.z);
            field.store(ch, cell, MIN_LIGHT);
            queues.removal.push_back((cell, MAX_LIGHT));
        }
        remove(field, ch, &mut queues.removal, &mut queues.scatter);
    } else if new_surface < old_surface {
        for y in new_surface..old_surface {
            queues.scatter.push_back(LocalPos::new(pos.x, y, pos.z));
        }
        scatter(field, ch, &mut queues.scatter);
    } else if new.light_step() > old.light_step() {
        let stored = field.stored(ch, pos);
        if stored > MIN_LIGHT {
            queues.removal.push_back((pos, stored));
            remove(field, ch, &mut queues.removal, &mut queues.scatter);
        }
    } else if new.light_step() < old.light_step() {
        queues.scatter.push_back(pos);
        queues.scatter.extend(pos.neighbors());
        scatter(field, ch, &mut queues.scatter);
    }
}

fn relight_block<F: LightField + ?Sized>(field: &mut F, pos: LocalPos, new: BlockId, queues: &mut LightQueues) {
    let ch = LightChannel::Block;
    let stored = field.stored(ch, pos);
    let emission = new.light_emitted();

    let mut removed = false;
    if emission < stored {
        queues.removal.push_back((pos, stored));
        remove(field, ch, &mut queues.removal, &mut queues.scatter);
        removed = true;
    }

    if emission > MIN_LIGHT {
        if field.stored(ch, pos) < emission {
            field.store(ch, pos, emission);
        }
        queues.scatter.push_back(pos);
        scatter(field, ch, &mut queues.scatter);
    } else if !removed {
        // Neighbors may now reach through a cell that used to block them.
        queues.scatter.extend(pos.neighbors());
        scatter(field, ch, &mut queues.scatter);
    }
}
