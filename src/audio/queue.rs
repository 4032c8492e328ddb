use std::collections::VecDeque;

use super::track::TrackInfo;

/// Estado de reproducción de una guild.
///
/// Mantiene la cola pendiente (FIFO), el historial acotado (LIFO) y el
/// track actual. No sincroniza nada por sí mismo: el acceso concurrente
/// se serializa con el mutex por guild del `GuildMusicManager`.
#[derive(Debug)]
pub struct GuildMusicQueue {
    pending: VecDeque<TrackInfo>,
    history: VecDeque<TrackInfo>,
    current: Option<TrackInfo>,
    paused: bool,
    max_history: usize,
}

impl GuildMusicQueue {
    pub fn new(max_history: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            history: VecDeque::new(),
            current: None,
            paused: false,
            max_history,
        }
    }

    pub fn enqueue(&mut self, track: TrackInfo) {
        self.pending.push_back(track);
    }

    pub fn dequeue(&mut self) -> Option<TrackInfo> {
        self.pending.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Vacía la cola pendiente. No toca el track actual ni el historial.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn current(&self) -> Option<&TrackInfo> {
        self.current.as_ref()
    }

    /// Cambia el track actual. El anterior, si había, pasa al frente del
    /// historial; eso vale también cuando el nuevo valor es `None`.
    pub fn set_current(&mut self, track: Option<TrackInfo>) {
        if let Some(previous) = self.current.take() {
            self.push_history(previous);
        }
        self.current = track;
    }

    pub fn push_history(&mut self, track: TrackInfo) {
        self.history.push_front(track);
        while self.history.len() > self.max_history {
            self.history.pop_back();
        }
    }

    /// Saca el track reemplazado más recientemente.
    pub fn pop_history(&mut self) -> Option<TrackInfo> {
        self.history.pop_front()
    }

    #[allow(dead_code)]
    pub fn has_history(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    fn track(title: &str) -> TrackInfo {
        TrackInfo {
            title: title.to_string(),
            author: "autor".to_string(),
            uri: None,
            duration_ms: 1000,
            requester_id: UserId::new(1),
            requester_name: "tester".to_string(),
            encoded: format!("enc-{title}"),
        }
    }

    #[test]
    fn test_fifo_order_and_size() {
        let mut queue = GuildMusicQueue::new(50);

        queue.enqueue(track("a"));
        queue.enqueue(track("b"));
        queue.enqueue(track("c"));
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.dequeue().unwrap().title, "a");
        queue.enqueue(track("d"));
        assert_eq!(queue.dequeue().unwrap().title, "b");
        assert_eq!(queue.dequeue().unwrap().title, "c");
        assert_eq!(queue.dequeue().unwrap().title, "d");
        assert!(queue.dequeue().is_none());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_clear_only_empties_pending() {
        let mut queue = GuildMusicQueue::new(50);
        queue.set_current(Some(track("actual")));
        queue.enqueue(track("a"));
        queue.enqueue(track("b"));

        queue.clear();

        assert!(queue.is_empty());
        assert_eq!(queue.current().unwrap().title, "actual");
    }

    #[test]
    fn test_set_current_pushes_previous_to_history() {
        let mut queue = GuildMusicQueue::new(50);

        queue.set_current(Some(track("a")));
        assert!(!queue.has_history());

        queue.set_current(Some(track("b")));
        assert_eq!(queue.current().unwrap().title, "b");

        // "a" quedó al frente del historial
        assert_eq!(queue.pop_history().unwrap().title, "a");
    }

    #[test]
    fn test_set_current_none_also_pushes() {
        let mut queue = GuildMusicQueue::new(50);
        queue.set_current(Some(track("a")));

        queue.set_current(None);

        assert!(queue.current().is_none());
        assert_eq!(queue.pop_history().unwrap().title, "a");
    }

    #[test]
    fn test_history_bounded_drops_oldest() {
        let mut queue = GuildMusicQueue::new(3);

        for i in 0..5 {
            queue.push_history(track(&format!("t{i}")));
        }

        // Quedan los tres más recientes, en orden LIFO
        assert_eq!(queue.pop_history().unwrap().title, "t4");
        assert_eq!(queue.pop_history().unwrap().title, "t3");
        assert_eq!(queue.pop_history().unwrap().title, "t2");
        assert!(queue.pop_history().is_none());
    }

    #[test]
    fn test_paused_flag() {
        let mut queue = GuildMusicQueue::new(50);
        assert!(!queue.is_paused());
        queue.set_paused(true);
        assert!(queue.is_paused());
    }
}
