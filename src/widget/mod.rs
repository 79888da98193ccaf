pub mod comment_panel;
