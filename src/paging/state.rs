//! Cyclic page state machine.

/// A navigation request, decoded from a button id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAction {
    Prev,
    Next,
    Refresh,
    Cancel,
    Unknown,
}

impl PageAction {
    /// The controls attached to a paged message, in display order.
    pub const CONTROLS: [PageAction; 4] = [
        PageAction::Prev,
        PageAction::Next,
        PageAction::Refresh,
        PageAction::Cancel,
    ];

    pub fn from_button_id(id: &str) -> Self {
        match id {
            "left_page" => PageAction::Prev,
            "right_page" => PageAction::Next,
            "refresh" => PageAction::Refresh,
            "cancel" => PageAction::Cancel,
            _ => PageAction::Unknown,
        }
    }

    pub fn button_id(self) -> Option<&'static str> {
        match self {
            PageAction::Prev => Some("left_page"),
            PageAction::Next => Some("right_page"),
            PageAction::Refresh => Some("refresh"),
            PageAction::Cancel => Some("cancel"),
            PageAction::Unknown => None,
        }
    }
}

/// What the view must do after an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Render this page and replace the displayed one.
    Render(usize),
    /// Stop listening and strip the controls.
    Close,
    /// Leave everything as it is.
    Ignore,
}

/// Current page over the cyclic range `0..=max_page`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageState {
    current_page: usize,
    max_page: usize,
}

impl PageState {
    /// Starts on page 0.
    pub fn new(max_page: usize) -> Self {
        Self {
            current_page: 0,
            max_page,
        }
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn max_page(&self) -> usize {
        self.max_page
    }

    /// Changes the last page, e.g. when the paged data grew or shrank.
    ///
    /// A current page past the new last page moves to the last page.
    pub fn set_max_page(&mut self, max_page: usize) {
        self.max_page = max_page;
        self.current_page = self.current_page.min(max_page);
    }

    fn modulus(&self) -> usize {
        self.max_page.saturating_add(1)
    }

    pub fn apply(&mut self, action: PageAction) -> Transition {
        match action {
            PageAction::Prev => {
                self.current_page = match self.current_page {
                    0 => self.modulus() - 1,
                    page => page - 1,
                };
                Transition::Render(self.current_page)
            }
            PageAction::Next => {
                self.current_page = (self.current_page + 1) % self.modulus();
                Transition::Render(self.current_page)
            }
            PageAction::Refresh => Transition::Render(self.current_page),
            PageAction::Cancel => Transition::Close,
            PageAction::Unknown => Transition::Ignore,
        }
    }

    /// Jumps to `page`, wrapping any integer into range the way repeated
    /// `Next`/`Prev` would. Returns the normalized page.
    pub fn set_page(&mut self, page: i64) -> usize {
        let wrapped = i128::from(page).rem_euclid(self.modulus() as i128);
        // `wrapped` is in `0..modulus`, so it fits.
        self.current_page = wrapped as usize;
        self.current_page
    }
}
